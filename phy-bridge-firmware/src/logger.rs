//! RTT-backed sink for the `log` crate, drained out-of-band from the capture stream.
//!
//! Log records never share the UART with PCAPNG bytes: they're queued into a `bbqueue` ring and
//! flushed to an RTT up-channel from the idle task, the same split the teacher's demo binaries use
//! for their own stack-internal logging.

#![cfg_attr(not(feature = "log"), allow(unused))]

use bbqueue::{ArrayLength, BBBuffer, ConstBBBuffer, Consumer, GrantW, Producer};
use core::cell::RefCell;
use core::fmt;
use cortex_m::interrupt::{self, Mutex};
#[cfg(feature = "log")]
use log::LevelFilter;
use log::{Log, Metadata, Record};
use phy_bridge::time::Timer;
use phy_bridge_nrf5x::timer::StampSource;

#[cfg(feature = "log")]
pub(crate) use bbqueue::consts::U4096 as BufferSize;

#[cfg(not(feature = "log"))]
pub(crate) use bbqueue::consts::U1 as BufferSize;

type LogTimer = crate::hal::pac::TIMER1;
type Logger = StampedLogger<StampSource<LogTimer>, BbqLogger<'static, BufferSize>>;

static mut LOGGER: Option<WriteLogger<Logger>> = None;
static BUFFER: BBBuffer<BufferSize> = BBBuffer(ConstBBBuffer::new());

#[cfg(feature = "log")]
pub fn init(timer: StampSource<LogTimer>) -> Consumer<'static, BufferSize> {
    let (tx, log_sink) = BUFFER.try_split().unwrap();
    let logger = StampedLogger::new(BbqLogger::new(tx), timer);
    let log = WriteLogger::new(logger);
    interrupt::free(|_| unsafe {
        LOGGER = Some(log);
        log::set_logger(LOGGER.as_ref().unwrap()).unwrap();
    });
    log::set_max_level(LevelFilter::max());
    log::info!("phy bridge ready");
    log_sink
}

#[cfg(not(feature = "log"))]
pub fn init(_timer: StampSource<LogTimer>) -> Consumer<'static, BufferSize> {
    BUFFER.try_split().unwrap().1
}

/// A `fmt::Write` adapter that prints a timestamp before each line.
struct StampedLogger<T: Timer, L: fmt::Write> {
    timer: T,
    inner: L,
}

impl<T: Timer, L: fmt::Write> StampedLogger<T, L> {
    fn new(inner: L, timer: T) -> Self {
        Self { inner, timer }
    }
}

impl<T: Timer, L: fmt::Write> fmt::Write for StampedLogger<T, L> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for (i, line) in s.split('\n').enumerate() {
            if i != 0 {
                write!(self.inner, "\n{} - ", self.timer.now())?;
            }
            self.inner.write_str(line)?;
        }
        Ok(())
    }
}

const DATA_LOST_MSG: &str = "...\n";

/// A `fmt::Write` sink that writes into a `bbqueue` ring, dropping (and flagging) data rather than
/// blocking when the ring is full.
struct BbqLogger<'a, N: ArrayLength<u8>> {
    p: Producer<'a, N>,
    data_lost: bool,
}

impl<'a, N: ArrayLength<u8>> BbqLogger<'a, N> {
    fn new(p: Producer<'a, N>) -> Self {
        Self { p, data_lost: false }
    }
}

impl<N: ArrayLength<u8>> fmt::Write for BbqLogger<'_, N> {
    fn write_str(&mut self, msg: &str) -> fmt::Result {
        let mut msg_bytes = msg.as_bytes();
        while !msg_bytes.is_empty() {
            let lost_len = if self.data_lost { DATA_LOST_MSG.as_bytes().len() } else { 0 };
            match self.p.grant_max_remaining(lost_len + msg_bytes.len()) {
                Ok(mut grant) => {
                    let mut written = 0;
                    if self.data_lost {
                        written += append(&mut grant, written, DATA_LOST_MSG.as_bytes());
                        self.data_lost = false;
                    }
                    written += append(&mut grant, written, msg_bytes);
                    msg_bytes = &msg_bytes[msg_bytes.len().min(written)..];
                    grant.commit(written);
                }
                Err(_) => {
                    self.data_lost = true;
                    break;
                }
            }
        }
        Ok(())
    }
}

fn append<N: ArrayLength<u8>>(grant: &mut GrantW<'_, N>, offset: usize, data: &[u8]) -> usize {
    let buffer = grant.buf();
    let remaining = buffer.len() - offset;
    let n = remaining.min(data.len());
    buffer[offset..offset + n].copy_from_slice(&data[..n]);
    n
}

/// Forwards the `log` crate's macros to an inner `fmt::Write`, made `Sync` via a `cortex_m` mutex.
struct WriteLogger<W: fmt::Write + Send> {
    writer: Mutex<RefCell<W>>,
}

impl<W: fmt::Write + Send> WriteLogger<W> {
    fn new(writer: W) -> Self {
        Self { writer: Mutex::new(RefCell::new(writer)) }
    }
}

impl<W: fmt::Write + Send> Log for WriteLogger<W> {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            interrupt::free(|cs| {
                use core::fmt::Write;
                let mut writer = self.writer.borrow(cs).borrow_mut();
                writeln!(writer, "{} - {}", record.level(), record.args()).ok();
            })
        }
    }

    fn flush(&self) {}
}
