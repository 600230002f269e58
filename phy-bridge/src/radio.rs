//! The radio driver abstraction consumed by the PHY dispatcher.
//!
//! The dispatcher does not talk to registers directly; it drives the physical transceiver through
//! this narrow, synchronous trait. A board support crate implements [`RadioDriver`] once per MCU
//! family, the same way [`crate::time::Timer`] is implemented once per timer peripheral.

use crate::phy::PhyAttribute;

/// A parameter settable or gettable on the radio via [`RadioDriver::get_value`] /
/// [`RadioDriver::set_value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioParam {
    Channel,
    TxPower,
    CcaMode,
    CurrentPage,
    ShrDuration,
    SymbolsPerOctet,
    RssiThreshold,
    PhyState,
}

/// A parameter gettable via [`RadioDriver::get_object`] (wider than a single register read).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioObject {
    ChannelsSupported,
    MaxFrameDuration,
}

/// Outcome of a `get`/`set`/`channel_clear` radio operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverResult {
    /// Operation succeeded.
    Ok,
    /// Parameter or attribute is not implemented by this driver.
    NotSupported,
    /// Parameter is read-only on this driver.
    ReadOnly,
    /// Supplied value is out of range for this parameter.
    InvalidValue,
    /// Radio reported a generic error.
    Error,
    /// Channel is currently busy (used by `channel_clear`).
    Busy,
    /// Channel is currently idle (used by `channel_clear`).
    Idle,
    /// Transceiver is off (used by `channel_clear`).
    TrxOff,
}

/// Outcome of a [`RadioDriver::send`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxResult {
    Ok,
    Error,
    Collision,
    NoAck,
}

/// Narrow, synchronous interface to the physical IEEE 802.15.4 transceiver.
///
/// All operations are expected to be bounded and to run to completion before returning; the
/// dispatcher treats calls into this trait as blocking steps of a single cooperative task.
pub trait RadioDriver {
    /// Initializes the radio into its default operating state.
    fn init(&mut self) -> DriverResult;

    /// Transmits `psdu` (already including any required preamble/SFD framing handled by the
    /// driver) and returns the outcome of the transmission attempt.
    fn send(&mut self, psdu: &[u8]) -> TxResult;

    /// Performs a Clear Channel Assessment and reports the channel state.
    fn channel_clear(&mut self) -> DriverResult;

    /// Reads a scalar parameter into `value`.
    fn get_value(&mut self, param: RadioParam, value: &mut u32) -> DriverResult;

    /// Writes a scalar parameter.
    fn set_value(&mut self, param: RadioParam, value: u32) -> DriverResult;

    /// Reads a wide parameter into `dst`, writing at most `dst.len()` bytes.
    fn get_object(&mut self, object: RadioObject, dst: &mut [u8]) -> DriverResult;

    /// Polls for a PSDU received since the last call, copying it into `psdu` (which must be at
    /// least [`crate::phy::MAX_PSDU`] bytes long) and returning its length and
    /// `ppduLinkQuality`. Returns `None` if nothing has been received.
    ///
    /// Boards whose radio raises a true interrupt on reception instead post received frames
    /// through an [`crate::queue::IndicationQueue`] and never need to override this; the default
    /// always reports nothing received.
    fn poll_received(&mut self, psdu: &mut [u8]) -> Option<(usize, u8)> {
        let _ = psdu;
        None
    }

    /// Returns the RSSI threshold used to compute `ppduLinkQuality`, plus the attribute's wire
    /// width — a convenience used to implement [`RadioObject`]/[`RadioParam`] dispatch
    /// symmetrically with the PIB attribute table.
    fn attribute_width(attr: PhyAttribute) -> usize
    where
        Self: Sized,
    {
        attr.value_width()
    }
}

/// Maps a [`DriverResult`] from a GET/SET/SET-TRX-STATE/CCA call to a [`crate::phy::PhyStatus`],
/// per the fixed table in the PHY dispatcher design.
pub fn result_to_status(result: DriverResult) -> crate::phy::PhyStatus {
    use crate::phy::PhyStatus;
    match result {
        DriverResult::Ok => PhyStatus::Success,
        DriverResult::NotSupported => PhyStatus::UnsupportAttribute,
        DriverResult::ReadOnly => PhyStatus::ReadOnly,
        DriverResult::InvalidValue | DriverResult::Error => PhyStatus::InvalidParameter,
        DriverResult::Busy => PhyStatus::Busy,
        DriverResult::Idle => PhyStatus::Idle,
        DriverResult::TrxOff => PhyStatus::TrxOff,
    }
}

/// Maps a [`TxResult`] from [`RadioDriver::send`] to a [`crate::phy::PhyStatus`].
pub fn tx_result_to_status(result: TxResult) -> crate::phy::PhyStatus {
    use crate::phy::PhyStatus;
    match result {
        TxResult::Ok => PhyStatus::Success,
        TxResult::Error => PhyStatus::InvalidParameter,
        TxResult::Collision => PhyStatus::BusyTx,
        TxResult::NoAck => PhyStatus::BusyTx,
    }
}
