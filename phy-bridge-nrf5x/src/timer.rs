//! `Timer`/`Sleeper` implementation backed by the nRF5x's 32-bit timer peripherals.

use core::mem;

use crate::pac::{TIMER0, TIMER1, TIMER2};
use phy_bridge::time::{Instant, Sleeper, Timer};

/// Implements [`phy_bridge::time::Timer`] and [`phy_bridge::time::Sleeper`] for the nRF timer
/// peripherals.
///
/// `CC[0]` is used to capture the current counter value; no interrupt is armed, since the
/// dispatcher paces itself with the polling/busy-wait `Sleeper` methods rather than a hardware
/// timer interrupt.
pub struct PhyTimer<T: NrfTimerExt> {
    inner: T,
}

impl<T: NrfTimerExt> PhyTimer<T> {
    /// Initializes the timer so it free-runs at 1 MHz.
    pub fn init(mut peripheral: T) -> Self {
        peripheral.init();
        Self { inner: peripheral }
    }

    /// Creates a `StampSource` sharing the same underlying peripheral, restricted to reading the
    /// current time.
    pub fn create_stamp_source(&self) -> StampSource<T> {
        StampSource { inner: unsafe { self.inner.duplicate() } }
    }

    /// Provides access to the raw peripheral. Use with caution.
    pub fn inner(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: NrfTimerExt> Timer for PhyTimer<T> {
    fn now(&self) -> Instant {
        self.inner.now()
    }
}

impl<T: NrfTimerExt> Sleeper for PhyTimer<T> {
    fn sleep_coarse_ms(&mut self, millis: u32) {
        // No lower-power wait source is wired up; coarse and fine sleeps both spin on the timer.
        self.sleep_fine_us(millis.saturating_mul(1_000));
    }

    fn sleep_fine_us(&mut self, micros: u32) {
        let start = self.now();
        while self.now().duration_since(start).as_micros() < micros {}
    }
}

/// A timer interface that only allows reading the current time stamp.
pub struct StampSource<T: NrfTimerExt> {
    inner: T,
}

impl<T: NrfTimerExt> Timer for StampSource<T> {
    fn now(&self) -> Instant {
        self.inner.now()
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Extension trait implemented for the nRF timer peripherals. `CC[0]` is used to read the
/// counter value.
pub trait NrfTimerExt: sealed::Sealed {
    unsafe fn duplicate(&self) -> Self;

    /// Initializes the timer so that it free-runs at a rate of 1 MHz.
    fn init(&mut self);

    /// Obtains the current time as an `Instant`.
    fn now(&self) -> Instant;
}

macro_rules! impl_timer {
    ($ty:ident) => {
        impl NrfTimerExt for $ty {
            unsafe fn duplicate(&self) -> Self {
                mem::transmute_copy(self)
            }

            fn init(&mut self) {
                self.bitmode.write(|w| w.bitmode()._32bit());
                // 2^4 = 16; 16 MHz / 16 = 1 MHz = µs resolution
                self.prescaler.write(|w| unsafe { w.prescaler().bits(4) });
                self.tasks_clear.write(|w| unsafe { w.bits(1) });
                self.tasks_start.write(|w| unsafe { w.bits(1) });
            }

            fn now(&self) -> Instant {
                self.tasks_capture[0].write(|w| unsafe { w.bits(1) });
                let micros = self.cc[0].read().bits();
                Instant::from_raw_micros(micros)
            }
        }

        impl sealed::Sealed for $ty {}
    };
}

impl_timer!(TIMER0);
impl_timer!(TIMER1);
impl_timer!(TIMER2);
