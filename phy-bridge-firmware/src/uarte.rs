//! Thin blocking/single-byte-DMA driver for the UARTE peripheral carrying the PCAPNG capture
//! stream.
//!
//! TX is a straightforward EasyDMA blocking transfer. RX is driven one byte at a time: the RX
//! interrupt handler re-arms a fresh single-byte DMA transfer on every received byte, trading
//! throughput for a trivially bounded RX buffer, which is fine at the capture stream's bit rate.

use nrf52840_hal::gpio::{Floating, Input, Output, Pin, PushPull};
use nrf52840_hal::pac::UARTE0;

pub fn init(uarte: &UARTE0, txd: Pin<Output<PushPull>>, rxd: Pin<Input<Floating>>) {
    uarte.psel.txd.write(|w| unsafe { w.pin().bits(txd.pin()).connect().connected() });
    uarte.psel.rxd.write(|w| unsafe { w.pin().bits(rxd.pin()).connect().connected() });
    uarte.psel.cts.write(|w| w.connect().disconnected());
    uarte.psel.rts.write(|w| w.connect().disconnected());

    uarte.baudrate.write(|w| w.baudrate().baud115200());
    uarte.config.write(|w| w.hwfc().disabled().parity().excluded());
    uarte.enable.write(|w| w.enable().enabled());

    uarte.intenset.write(|w| w.endrx().set_bit());
}

/// Starts a one-byte RX DMA transfer into `byte`.
pub fn start_rx(uarte: &UARTE0, byte: &mut [u8; 1]) {
    uarte.events_endrx.reset();
    uarte.rxd.ptr.write(|w| unsafe { w.ptr().bits(byte.as_mut_ptr() as u32) });
    uarte.rxd.maxcnt.write(|w| unsafe { w.maxcnt().bits(1) });
    uarte.tasks_startrx.write(|w| unsafe { w.bits(1) });
}

/// Checks for (and acknowledges) a completed single-byte RX transfer. Returns `true` if `byte`
/// holds a freshly-received byte.
pub fn take_rx_byte(uarte: &UARTE0, _byte: &mut [u8; 1]) -> bool {
    if uarte.events_endrx.read().events_endrx().bit_is_set() {
        uarte.events_endrx.reset();
        true
    } else {
        false
    }
}

/// Blocking EasyDMA transmit of `data`, which must be no longer than 255 bytes.
pub fn write_blocking(uarte: &UARTE0, data: &[u8]) {
    if data.is_empty() {
        return;
    }
    uarte.events_endtx.reset();
    uarte.txd.ptr.write(|w| unsafe { w.ptr().bits(data.as_ptr() as u32) });
    uarte.txd.maxcnt.write(|w| unsafe { w.maxcnt().bits(data.len() as _) });
    uarte.tasks_starttx.write(|w| unsafe { w.bits(1) });
    while uarte.events_endtx.read().events_endtx().bit_is_clear() {}
    uarte.events_endtx.reset();
}
