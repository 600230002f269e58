//! 802.15.4 PHY driver for the nRF52's built-in 2.4 GHz radio, implementing
//! [`phy_bridge::radio::RadioDriver`].
//!
//! The radio's hardware CCA, CRC, and framing support are configured for 802.15.4-2006 O-QPSK
//! mode once at construction; `send`/`channel_clear` then drive the peripheral's
//! enable-RX/CCA/TX-or-disable shortcut chain and poll to completion, since the PHY dispatcher
//! treats every [`RadioDriver`](phy_bridge::radio::RadioDriver) call as a bounded, synchronous
//! step. The radio otherwise free-runs in RX; [`RadioDriver::poll_received`] is a non-blocking
//! check of the `PHYEND` event, synchronous from the driver's own point of view regardless of
//! whether the caller happens to invoke it from a cooperative loop or a hardware interrupt task.

use core::sync::atomic::{compiler_fence, Ordering};

use crate::pac::RADIO;
use phy_bridge::radio::{DriverResult, RadioDriver, RadioObject, RadioParam, TxResult};

/// Maximum on-air frame the radio's packet buffer must hold: 1 length octet + 127 PSDU octets + 2
/// octets of hardware-appended FCS.
const MAX_FRAME: usize = 1 + 127 + 2;

const CRC_POLYNOMIAL: u32 = 0x0001_1021;
const CCA_ED_THRESHOLD_DEFAULT: u8 = 20;
const CCA_CORR_THRESHOLD_DEFAULT: u8 = 20;
const CCA_CORR_LIMIT_DEFAULT: u8 = 2;
const SFD_DEFAULT: u8 = 0xA7;

/// RSSI threshold (dBm) the driver reports to the dispatcher for `ppduLinkQuality` computation.
pub const RSSI_THRESHOLD: i8 = -90;

pub struct Radio {
    radio: RADIO,
    buffer: [u8; MAX_FRAME],
    cca_mode: u8,
    power: i8,
}

impl Radio {
    /// Takes ownership of the `RADIO` peripheral and configures it for 802.15.4 O-QPSK, channel
    /// 11, 0 dBm, CCA mode 1 (energy above threshold).
    pub fn new(mut radio: RADIO) -> Self {
        radio.mode.write(|w| w.mode().ieee802154_250kbit());
        radio.crccnf.write(|w| w.len().two().skipaddr().ieee802154());
        unsafe {
            radio.crcpoly.write(|w| w.crcpoly().bits(CRC_POLYNOMIAL));
            radio.crcinit.write(|w| w.crcinit().bits(0));
            radio.pcnf0.write(|w| {
                w.lflen()
                    .bits(8)
                    .s0len()
                    .clear_bit()
                    .s1len()
                    .bits(0)
                    .s1incl()
                    .clear_bit()
                    .plen()
                    ._32bit_zero()
                    .crcinc()
                    .set_bit()
            });
            radio.pcnf1.write(|w| {
                w.maxlen()
                    .bits(MAX_FRAME as u8)
                    .statlen()
                    .bits(0)
                    .balen()
                    .bits(0)
                    .endian()
                    .clear_bit()
                    .whiteen()
                    .clear_bit()
            });
            radio.sfd.write(|w| w.sfd().bits(SFD_DEFAULT));
            radio.intenclr.write(|w| w.bits(0xFFFF_FFFF));
        }
        // PHYEND fires on both RX and TX completion; the board's RADIO interrupt task relies on
        // `transmit`/`run_cca` already having consumed and reset the event by the time it runs
        // at the same task priority, so only RX completions reach `poll_received`.
        radio.intenset.write(|w| w.phyend().set_bit());
        let mut this = Self { radio, buffer: [0; MAX_FRAME], cca_mode: 1, power: 0 };
        this.configure_cca(1);
        this.set_channel(11);
        this.set_power(0);
        this
    }

    fn enter_disabled(&mut self) {
        if !self.is_disabled() {
            self.radio.tasks_disable.write(|w| w.tasks_disable().set_bit());
            while self.radio.events_disabled.read().events_disabled().bit_is_clear() {}
        }
        self.radio.events_disabled.reset();
    }

    fn is_disabled(&self) -> bool {
        self.radio.state.read().state().is_disabled()
    }

    fn set_channel(&mut self, channel: u8) {
        let frequency_offset = (channel - 10) * 5;
        self.radio
            .frequency
            .write(|w| unsafe { w.frequency().bits(frequency_offset).map().default() });
    }

    fn channel(&self) -> u8 {
        self.radio.frequency.read().frequency().bits() / 5 + 10
    }

    /// Sets the transmit power. Valid levels are 8, 7, 6, 5, 4, 3, 2, 0, -4, -8, -12, -16, -20,
    /// -40 dBm; any other requested value is snapped down to the nearest valid level at or below
    /// it.
    fn set_power(&mut self, dbm: i8) {
        let clamped = match dbm {
            d if d >= 8 => 8,
            7 => 7,
            6 => 6,
            5 => 5,
            4 => 4,
            d if d >= 0 => 0,
            d if d >= -4 => -4,
            d if d >= -8 => -8,
            d if d >= -12 => -12,
            d if d >= -16 => -16,
            d if d >= -20 => -20,
            _ => -40,
        };
        self.power = clamped;
        match clamped {
            8 => self.radio.txpower.write(|w| w.txpower().pos8d_bm()),
            7 => self.radio.txpower.write(|w| w.txpower().pos7d_bm()),
            6 => self.radio.txpower.write(|w| w.txpower().pos6d_bm()),
            5 => self.radio.txpower.write(|w| w.txpower().pos5d_bm()),
            4 => self.radio.txpower.write(|w| w.txpower().pos4d_bm()),
            0 => self.radio.txpower.write(|w| w.txpower()._0d_bm()),
            -4 => self.radio.txpower.write(|w| w.txpower().neg4d_bm()),
            -8 => self.radio.txpower.write(|w| w.txpower().neg8d_bm()),
            -12 => self.radio.txpower.write(|w| w.txpower().neg12d_bm()),
            -16 => self.radio.txpower.write(|w| w.txpower().neg16d_bm()),
            -20 => self.radio.txpower.write(|w| w.txpower().neg20d_bm()),
            _ => self.radio.txpower.write(|w| w.txpower().neg40d_bm()),
        }
    }

    fn configure_cca(&mut self, mode: u8) {
        self.cca_mode = mode;
        unsafe {
            self.radio.ccactrl.write(|w| {
                w.ccamode()
                    .ed_mode()
                    .ccaedthres()
                    .bits(CCA_ED_THRESHOLD_DEFAULT)
                    .ccacorrthres()
                    .bits(CCA_CORR_THRESHOLD_DEFAULT)
                    .ccacorrcnt()
                    .bits(CCA_CORR_LIMIT_DEFAULT)
            });
        }
    }

    /// Blocking clear-channel-assessment: ramps RX, runs one CCA cycle, reports the result, and
    /// returns to the disabled state.
    fn run_cca(&mut self) -> DriverResult {
        self.enter_disabled();
        self.radio.shorts.reset();
        self.radio.shorts.write(|w| w.rxready_ccastart().enabled());
        self.radio.events_ccaidle.reset();
        self.radio.events_ccabusy.reset();
        self.radio.tasks_rxen.write(|w| w.tasks_rxen().set_bit());
        let result = loop {
            if self.radio.events_ccaidle.read().events_ccaidle().bit_is_set() {
                break DriverResult::Idle;
            }
            if self.radio.events_ccabusy.read().events_ccabusy().bit_is_set() {
                break DriverResult::Busy;
            }
        };
        self.enter_disabled();
        result
    }

    /// Blocking transmit: loads `psdu` into the packet buffer (radio appends FCS), runs the
    /// enable-RX → CCA → TX shortcut chain, and waits for either completion or a CCA failure.
    fn transmit(&mut self, psdu: &[u8]) -> TxResult {
        if psdu.len() > 125 {
            return TxResult::Error;
        }
        self.enter_disabled();
        self.buffer[0] = (psdu.len() + 2) as u8;
        self.buffer[1..=psdu.len()].copy_from_slice(psdu);
        self.radio
            .packetptr
            .write(|w| unsafe { w.bits(self.buffer.as_ptr() as u32) });

        self.radio.shorts.reset();
        self.radio.shorts.write(|w| {
            w.rxready_ccastart()
                .enabled()
                .ccaidle_txen()
                .enabled()
                .txready_start()
                .enabled()
                .ccabusy_disable()
                .enabled()
                .phyend_disable()
                .enabled()
        });
        self.radio.events_phyend.reset();
        self.radio.events_ccabusy.reset();
        compiler_fence(Ordering::Release);
        self.radio.tasks_rxen.write(|w| w.tasks_rxen().set_bit());

        let result = loop {
            if self.radio.events_phyend.read().events_phyend().bit_is_set() {
                break TxResult::Ok;
            }
            if self.radio.events_ccabusy.read().events_ccabusy().bit_is_set() {
                break TxResult::Collision;
            }
        };
        self.radio.events_phyend.reset();
        self.radio.events_ccabusy.reset();
        self.enter_disabled();
        result
    }

    /// Re-arms continuous receive after a transmit or a consumed receive.
    pub fn receive_prepare(&mut self) {
        self.enter_disabled();
        self.radio.shorts.reset();
        self.radio
            .shorts
            .write(|w| w.rxready_start().enabled().phyend_start().enabled());
        self.radio.tasks_rxen.write(|w| w.tasks_rxen().set_bit());
    }
}

impl RadioDriver for Radio {
    fn init(&mut self) -> DriverResult {
        self.receive_prepare();
        DriverResult::Ok
    }

    fn send(&mut self, psdu: &[u8]) -> TxResult {
        let result = self.transmit(psdu);
        self.receive_prepare();
        result
    }

    fn channel_clear(&mut self) -> DriverResult {
        let result = self.run_cca();
        self.receive_prepare();
        result
    }

    fn get_value(&mut self, param: RadioParam, value: &mut u32) -> DriverResult {
        match param {
            RadioParam::Channel => {
                *value = u32::from(self.channel());
                DriverResult::Ok
            }
            RadioParam::TxPower => {
                *value = self.power as u32;
                DriverResult::Ok
            }
            RadioParam::CcaMode => {
                *value = u32::from(self.cca_mode);
                DriverResult::Ok
            }
            RadioParam::RssiThreshold => {
                *value = RSSI_THRESHOLD as u32;
                DriverResult::Ok
            }
            RadioParam::PhyState | RadioParam::CurrentPage | RadioParam::ShrDuration | RadioParam::SymbolsPerOctet => {
                DriverResult::NotSupported
            }
        }
    }

    fn set_value(&mut self, param: RadioParam, value: u32) -> DriverResult {
        match param {
            RadioParam::Channel => {
                if !(11..=26).contains(&value) {
                    return DriverResult::InvalidValue;
                }
                self.set_channel(value as u8);
                DriverResult::Ok
            }
            RadioParam::TxPower => {
                self.set_power(value as i8);
                DriverResult::Ok
            }
            RadioParam::CcaMode => {
                if value != 1 {
                    return DriverResult::InvalidValue;
                }
                self.configure_cca(value as u8);
                DriverResult::Ok
            }
            RadioParam::PhyState => DriverResult::Ok,
            RadioParam::CurrentPage | RadioParam::ShrDuration | RadioParam::SymbolsPerOctet | RadioParam::RssiThreshold => {
                DriverResult::ReadOnly
            }
        }
    }

    fn get_object(&mut self, object: RadioObject, dst: &mut [u8]) -> DriverResult {
        match object {
            RadioObject::ChannelsSupported if dst.len() >= 4 => {
                dst[..4].copy_from_slice(&0x07FF_F800u32.to_le_bytes());
                DriverResult::Ok
            }
            RadioObject::MaxFrameDuration if dst.len() >= 2 => {
                dst[..2].copy_from_slice(&266u16.to_le_bytes());
                DriverResult::Ok
            }
            _ => DriverResult::NotSupported,
        }
    }

    /// Checks for a completed receive, re-arming continuous RX once the frame is consumed.
    fn poll_received(&mut self, psdu: &mut [u8]) -> Option<(usize, u8)> {
        if !self.radio.events_phyend.read().events_phyend().bit_is_set() {
            return None;
        }
        self.radio.events_phyend.reset();
        let phr = self.buffer[0];
        let on_air_len = usize::from(phr & 0x7F);
        let result = if (2..=127).contains(&on_air_len) && on_air_len - 2 <= psdu.len() {
            let psdu_len = on_air_len - 2;
            psdu[..psdu_len].copy_from_slice(&self.buffer[1..=psdu_len]);
            let rssi = self.radio.rssisample.read().rssisample().bits();
            let link_quality = RSSI_THRESHOLD.saturating_add(rssi as i8).max(0) as u8;
            Some((psdu_len, link_quality))
        } else {
            None
        };
        self.receive_prepare();
        result
    }
}
