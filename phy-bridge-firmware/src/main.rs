#![no_std]
#![no_main]
#![warn(rust_2018_idioms)]

// We need to import this crate explicitly so we have a panic handler.
use panic_rtt_target as _;

mod logger;
mod ring_buffer;
mod uarte;

use nrf52840_hal as hal;

use bbqueue::Consumer as BbqConsumer;
use core::sync::atomic::{compiler_fence, Ordering};
use phy_bridge::bytes::ByteWriter;
use phy_bridge::config::Config;
use phy_bridge::dispatcher::Dispatcher;
use phy_bridge::pcapng::Parser;
use phy_bridge::queue::{Consume, Consumer};
use phy_bridge_nrf5x::{radio::Radio, timer::PhyTimer};
use rtt_target::{rtt_init, UpChannel};

/// The nRF52840's radio has no separate RX interrupt for PHY frames; received PSDUs are picked up
/// by polling [`Dispatcher::poll_radio`] from the cooperative task loop instead, so the dispatcher
/// needs no indication queue producer and is wired to this empty consumer.
struct NoIndications;

impl Consumer for NoIndications {
    fn has_data(&self) -> bool {
        false
    }

    fn consume_with<R>(&mut self, _f: impl FnOnce(&[u8]) -> Consume<R>) -> Result<R, phy_bridge::Error> {
        Err(phy_bridge::Error::Eof)
    }
}

/// Largest PCAPNG block the PHY bridge parser accumulates: an EPB carrying the maximum-size
/// `PD-DATA.indication` primitive, rounded up for header/trailer/padding.
const PARSER_BUF: usize = 160;

/// Capacity of the byte FIFO between the UART RX interrupt and the PCAPNG parser task.
const RX_RING_CAPACITY: usize = 256;

/// Scratch buffer for one outgoing PCAPNG block (confirm or indication EPB).
const TX_BUF: usize = 160;

pub enum AppConfig {}

impl Config for AppConfig {
    type Timer = PhyTimer<hal::pac::TIMER0>;
    type Radio = Radio;
}

#[rtic::app(device = crate::hal::pac, peripherals = true)]
const APP: () = {
    struct Resources {
        #[init(ring_buffer::RingBuffer::new())]
        rx_ring: ring_buffer::RingBuffer<RX_RING_CAPACITY>,
        parser: Parser<PARSER_BUF>,
        dispatcher: Dispatcher<AppConfig, NoIndications>,
        uarte: hal::pac::UARTE0,
        rx_byte: [u8; 1],
        log_channel: UpChannel,
        log_sink: BbqConsumer<'static, logger::BufferSize>,
    }

    #[init]
    fn init(ctx: init::Context) -> init::LateResources {
        let rtt = rtt_init! {
            up: {
                0: {
                    size: 1024
                    mode: NoBlockTrim
                    name: "PHY Bridge Capture"
                }
                1: {
                    size: 1024
                    mode: NoBlockTrim
                    name: "PHY Bridge Log"
                }
            }
        };
        let mut capture_channel = rtt.up.0;
        let log_channel = rtt.up.1;

        let _clocks = hal::clocks::Clocks::new(ctx.device.CLOCK).enable_ext_hfosc();

        let timer = PhyTimer::init(ctx.device.TIMER0);
        let log_timer = PhyTimer::init(ctx.device.TIMER1);
        let log_sink = logger::init(log_timer.create_stamp_source());

        let p0 = hal::gpio::p0::Parts::new(ctx.device.P0);
        let txd = p0.p0_06.into_push_pull_output(hal::gpio::Level::High).degrade();
        let rxd = p0.p0_08.into_floating_input().degrade();
        uarte::init(&ctx.device.UARTE0, txd, rxd);

        let mut radio = Radio::new(ctx.device.RADIO);
        phy_bridge::radio::RadioDriver::init(&mut radio);

        let dispatcher = Dispatcher::<AppConfig, NoIndications>::new(radio, timer, NoIndications);

        let mut tx_buf = [0u8; TX_BUF];
        let mut writer = ByteWriter::new(&mut tx_buf);
        dispatcher.write_preamble(&mut writer).unwrap();
        let written = TX_BUF - writer.space_left();
        uarte::write_blocking(&ctx.device.UARTE0, &tx_buf[..written]);
        // Mirror the startup preamble into the RTT capture channel for a host not yet attached
        // to the UART.
        capture_channel.write(&tx_buf[..written]);

        let mut rx_byte = [0u8; 1];
        uarte::start_rx(&ctx.device.UARTE0, &mut rx_byte);

        init::LateResources {
            parser: Parser::new(),
            dispatcher,
            uarte: ctx.device.UARTE0,
            rx_byte,
            log_channel,
            log_sink,
        }
    }

    // Highest priority: only touches the RX-side UARTE registers and the byte ring, so it shares
    // `uarte` and `rx_ring` with `pcapng` at a lower priority, which must lock them.
    #[task(binds = UARTE0_UART0, resources = [uarte, rx_byte, rx_ring], priority = 3, spawn = [pcapng])]
    fn uarte0(ctx: uarte0::Context) {
        if uarte::take_rx_byte(ctx.resources.uarte, ctx.resources.rx_byte) {
            let byte = ctx.resources.rx_byte[0];
            uarte::start_rx(ctx.resources.uarte, ctx.resources.rx_byte);
            if ctx.resources.rx_ring.put(byte) {
                ctx.spawn.pcapng().ok();
            }
        }
    }

    // `dispatcher` is owned jointly by this task and `radio`, both at priority 2: RTIC never lets
    // same-priority tasks preempt each other, so both get direct (lock-free) access to it.
    #[task(resources = [rx_ring, parser, dispatcher, uarte], priority = 2)]
    fn pcapng(mut ctx: pcapng::Context) {
        while let Some(byte) = ctx.resources.rx_ring.lock(|rx_ring| rx_ring.get()) {
            if let Some(event) = ctx.resources.parser.push(byte) {
                let mut tx_buf = [0u8; TX_BUF];
                let mut writer = ByteWriter::new(&mut tx_buf);
                let wrote = ctx.resources.dispatcher.handle_block(event, &mut writer).unwrap_or(false);
                if wrote {
                    let written = TX_BUF - writer.space_left();
                    ctx.resources.uarte.lock(|uarte| uarte::write_blocking(uarte, &tx_buf[..written]));
                }
            }
        }
    }

    // Bound to the radio's PHYEND event, which fires on every completed receive (and every
    // completed transmit, but `send`/`channel_clear` already consume and reset that occurrence
    // synchronously before this task, same priority as `pcapng`, gets to run).
    #[task(binds = RADIO, resources = [dispatcher, uarte], priority = 2)]
    fn radio(mut ctx: radio::Context) {
        let mut tx_buf = [0u8; TX_BUF];
        let mut writer = ByteWriter::new(&mut tx_buf);
        if ctx.resources.dispatcher.poll_radio(&mut writer).unwrap_or(false) {
            let written = TX_BUF - writer.space_left();
            ctx.resources.uarte.lock(|uarte| uarte::write_blocking(uarte, &tx_buf[..written]));
        }
    }

    #[idle(resources = [log_sink, log_channel])]
    fn idle(ctx: idle::Context) -> ! {
        let idle::Resources { log_sink, log_channel } = ctx.resources;
        loop {
            if cfg!(feature = "log") {
                while let Ok(grant) = log_sink.read() {
                    log_channel.write(grant.buf());
                    let len = grant.buf().len();
                    grant.release(len);
                }
            } else {
                // Work around https://github.com/rust-lang/rust/issues/28728
                compiler_fence(Ordering::SeqCst);
            }
        }
    }

    // One free interrupt vector to dispatch the sole software-spawned task (`pcapng`, priority 2).
    extern "C" {
        fn SWI0_EGU0();
    }
};
