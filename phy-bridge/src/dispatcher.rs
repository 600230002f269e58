//! The PHY dispatcher: decodes PHY SAP primitives carried in PCAPNG Enhanced Packet Blocks,
//! executes them against a [`RadioDriver`], paces replies against the host's simulated timeline,
//! and encodes confirms/indications back into EPBs.
//!
//! This is the cooperative task described by the PHY state machine design: one iteration per
//! incoming EPB event, plus a poll of the radio's receive path for unsolicited
//! `PD-DATA.indication`s (see [`Dispatcher::poll_radio`]), or an independent drain of indications
//! posted by a board through an [`IndicationQueue`](crate::queue::IndicationQueue) instead.

use crate::bytes::ByteWriter;
use crate::config::Config;
use crate::pcapng::{self, BlockEvent, BlockType, EnhancedPacketBlock, Timestamp};
use crate::phy::{AttributeValue, PhyAttribute, PhyMsg, Pib, Psdu, MAX_PSDU};
use crate::queue::{self, Consumer};
use crate::radio::{self, RadioDriver, RadioObject, RadioParam};
use crate::time::{Duration, Instant, Sleeper, Timer};
use crate::Error;

/// Wall-clock window (µs) within which the pacing loop switches from coarse 10&nbsp;ms chunks to a
/// single high-resolution sleep for the remainder.
const COARSE_THRESHOLD_MICROS: u32 = 20_000;

/// The PHY dispatcher's persistent state and the task driving it.
///
/// `C` supplies the timer and radio driver; `Qc` is the consumer half of whatever
/// [`queue::IndicationQueue`](crate::queue::IndicationQueue) the board wires the radio's receive
/// callback through.
pub struct Dispatcher<C: Config, Qc> {
    radio: C::Radio,
    timer: C::Timer,
    indications: Qc,
    pib: Pib,
    anchor: Option<(Timestamp, Instant)>,
    packet_count: u32,
}

impl<C: Config, Qc: Consumer> Dispatcher<C, Qc> {
    /// Builds a new dispatcher. `radio.init()` is expected to have already been called by the
    /// caller; this constructor only reads the radio's fixed capability attributes into the PIB.
    pub fn new(mut radio: C::Radio, timer: C::Timer, indications: Qc) -> Self {
        let mut pib = Pib::default();

        let mut channels = [0u8; 4];
        if radio.get_object(RadioObject::ChannelsSupported, &mut channels) == radio::DriverResult::Ok {
            pib.channels_supported = u32::from_le_bytes(channels);
        }
        let mut duration = [0u8; 2];
        if radio.get_object(RadioObject::MaxFrameDuration, &mut duration) == radio::DriverResult::Ok {
            pib.max_frame_duration = u16::from_le_bytes(duration);
        }

        Self {
            radio,
            timer,
            indications,
            pib,
            anchor: None,
            packet_count: 0,
        }
    }

    /// The number of PHY SAP primitive frames decoded so far (diagnostic only).
    pub fn packet_count(&self) -> u32 {
        self.packet_count
    }

    /// Writes the capture preamble (SHB, IDB for PHY, IDB for NO-FCS) to `out`.
    ///
    /// Must be called exactly once, before any call to [`Dispatcher::handle_block`].
    pub fn write_preamble(&self, out: &mut ByteWriter<'_>) -> Result<(), Error> {
        pcapng::write_shb(out)?;
        pcapng::write_idb(out, pcapng::DLT_IEEE802_15_4_PHY, 128)?;
        pcapng::write_idb(out, pcapng::DLT_IEEE802_15_4_NO_FCS, 128)
    }

    /// Handles one block decoded by the PCAPNG parser.
    ///
    /// Only Enhanced Packet Blocks on the PHY interface carry dispatchable primitives; any other
    /// block (or an EPB on a different interface) is ignored. Returns whether a reply was written
    /// to `out`.
    pub fn handle_block(&mut self, event: BlockEvent<'_>, out: &mut ByteWriter<'_>) -> Result<bool, Error> {
        match event.block_type {
            BlockType::EnhancedPacket => self.handle_epb(event.body, out),
            BlockType::SectionHeader | BlockType::InterfaceDescription => Ok(false),
        }
    }

    /// Drains at most one unsolicited indication from the indication queue, writing it as an EPB
    /// to `out` if one was queued. Returns whether a frame was written.
    pub fn drain_indication(&mut self, out: &mut ByteWriter<'_>) -> Result<bool, Error> {
        if !self.indications.has_data() {
            return Ok(false);
        }

        let ts = self.now_timestamp();
        let mut wrote = false;
        self.indications.consume_with(|frame| {
            wrote = pcapng::write_epb(out, pcapng::IFACE_PHY, ts, frame).is_ok();
            queue::Consume::new(wrote, ())
        })?;
        Ok(wrote)
    }

    /// Polls the radio directly for a received PSDU and, if one is ready, encodes it as a
    /// `PD-DATA.indication` EPB. Returns whether a frame was written.
    ///
    /// Call this whenever the board learns the radio may have a frame ready — a receive
    /// interrupt, or a periodic tick. It runs the actual `RadioDriver` poll and PHY encoding
    /// inline, so the caller must already hold whatever ensures `self.radio` isn't also being
    /// driven by [`Dispatcher::handle_block`] at the same time (e.g. equal RTIC task priority).
    /// Boards whose driver instead hands received frames off to a separate owner should route
    /// them through [`Dispatcher::drain_indication`] and a board-owned
    /// [`queue::IndicationQueue`] producer instead.
    pub fn poll_radio(&mut self, out: &mut ByteWriter<'_>) -> Result<bool, Error> {
        let mut buf = [0u8; MAX_PSDU];
        let (len, link_quality) = match self.radio.poll_received(&mut buf) {
            Some(v) => v,
            None => return Ok(false),
        };
        let psdu = Psdu::from_slice(&buf[..len])?;
        let msg = PhyMsg::PdDataIndication { psdu, ppdu_link_quality: link_quality };
        self.emit(msg, out)?;
        Ok(true)
    }

    fn handle_epb(&mut self, body: &[u8], out: &mut ByteWriter<'_>) -> Result<bool, Error> {
        let epb = EnhancedPacketBlock::parse(body)?;
        if epb.interface_id != pcapng::IFACE_PHY {
            return Ok(false);
        }

        self.packet_count += 1;
        self.pace(epb.timestamp);

        let (msg, _) = match PhyMsg::decode(epb.data) {
            Ok(v) => v,
            // Unknown type/attribute or a truncated body: drop silently, no confirm synthesized.
            Err(e) => {
                debug!("dropping undecodable primitive: {:?}", e);
                return Ok(false);
            }
        };

        match self.dispatch(msg) {
            Some(reply) => {
                self.emit(reply, out)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Anchors the real-time clock to the first event's timestamp, then sleeps until the wall
    /// time corresponding to `event_ts + Duration::TURNAROUND` in the host's simulated timeline.
    fn pace(&mut self, event_ts: Timestamp) {
        let now = self.timer.now();
        let (anchor_sim, anchor_real) = *self.anchor.get_or_insert((event_ts, now));

        let elapsed_sim = elapsed_micros(anchor_sim, event_ts);
        let target = anchor_real + Duration::from_micros(elapsed_sim) + Duration::TURNAROUND;
        self.pace_to(target);
    }

    fn pace_to(&mut self, target: Instant) {
        loop {
            let now = self.timer.now();
            // Interpreting the wrapping difference as signed tells past from future as long as
            // the two instants are within `i32::MAX` microseconds of each other, comfortably
            // inside `Instant::MAX_TIME_BETWEEN`.
            let remaining = target.raw_micros().wrapping_sub(now.raw_micros()) as i32;
            if remaining <= 0 {
                return;
            }
            let remaining = remaining as u32;
            if remaining > COARSE_THRESHOLD_MICROS {
                self.timer.sleep_coarse_ms(10);
            } else {
                self.timer.sleep_fine_us(remaining);
                return;
            }
        }
    }

    fn dispatch(&mut self, msg: PhyMsg) -> Option<PhyMsg> {
        Some(match msg {
            PhyMsg::PdDataRequest { psdu } => {
                let result = self.radio.send(psdu.as_slice());
                if result != radio::TxResult::Ok {
                    debug!("PD-DATA.request: radio reported {:?}", result);
                }
                PhyMsg::PdDataConfirm { status: radio::tx_result_to_status(result) }
            }
            PhyMsg::PlmeCcaRequest => {
                let result = self.radio.channel_clear();
                PhyMsg::PlmeCcaConfirm { status: radio::result_to_status(result) }
            }
            // Energy detect is unsupported by the reference radio; always report it as such.
            PhyMsg::PlmeEdRequest => PhyMsg::PlmeEdConfirm {
                status: crate::phy::PhyStatus::UnsupportAttribute,
                energy_level: 0,
            },
            PhyMsg::PlmeGetRequest { attribute } => self.handle_get(attribute),
            PhyMsg::PlmeSetTrxStateRequest { state } => {
                let result = self.radio.set_value(RadioParam::PhyState, state as u32);
                PhyMsg::PlmeSetTrxStateConfirm { status: radio::result_to_status(result) }
            }
            PhyMsg::PlmeSetRequest { value } => self.handle_set(value),
            // Confirms and indications are replies, never requests; a host shouldn't send them,
            // and there is nothing to dispatch if it does.
            PhyMsg::PdDataConfirm { .. }
            | PhyMsg::PdDataIndication { .. }
            | PhyMsg::PlmeCcaConfirm { .. }
            | PhyMsg::PlmeEdConfirm { .. }
            | PhyMsg::PlmeGetConfirm { .. }
            | PhyMsg::PlmeSetTrxStateConfirm { .. }
            | PhyMsg::PlmeSetConfirm { .. } => return None,
        })
    }

    fn handle_get(&mut self, attribute: u8) -> PhyMsg {
        let attr = match PhyAttribute::from_u8(attribute) {
            Some(attr) => attr,
            None => {
                debug!("PLME-GET.request: unsupported attribute {}", attribute);
                return PhyMsg::PlmeGetConfirm {
                    status: crate::phy::PhyStatus::UnsupportAttribute,
                    attribute,
                    value: None,
                }
            }
        };

        // Read-only attributes are fixed for the process lifetime and served from the PIB
        // snapshot taken at construction; writable ones are read through to the driver so GET
        // never returns stale state after a prior SET.
        let value = match attr {
            PhyAttribute::ChannelsSupported => AttributeValue::ChannelsSupported(self.pib.channels_supported),
            PhyAttribute::MaxFrameDuration => AttributeValue::MaxFrameDuration(self.pib.max_frame_duration),
            PhyAttribute::ShrDuration => AttributeValue::ShrDuration(self.pib.shr_duration),
            PhyAttribute::SymbolsPerOctet => AttributeValue::SymbolsPerOctet(self.pib.symbols_per_octet),
            PhyAttribute::CurrentPage => AttributeValue::CurrentPage(self.pib.current_page),
            PhyAttribute::CurrentChannel => AttributeValue::CurrentChannel(self.read_u8(RadioParam::Channel)),
            PhyAttribute::TransmitPower => AttributeValue::TransmitPower(self.read_u8(RadioParam::TxPower)),
            PhyAttribute::CcaMode => AttributeValue::CcaMode(self.read_u8(RadioParam::CcaMode)),
        };

        PhyMsg::PlmeGetConfirm {
            status: crate::phy::PhyStatus::Success,
            attribute,
            value: Some(value),
        }
    }

    fn read_u8(&mut self, param: RadioParam) -> u8 {
        let mut v = 0u32;
        let _ = self.radio.get_value(param, &mut v);
        v as u8
    }

    fn handle_set(&mut self, value: AttributeValue) -> PhyMsg {
        let attr = value.attribute();
        let attribute = attr as u8;

        if attr.is_read_only() {
            warn!("PLME-SET.request: rejecting write to read-only attribute {:?}", attr);
            return PhyMsg::PlmeSetConfirm { status: crate::phy::PhyStatus::ReadOnly, attribute };
        }

        let (param, raw) = match value {
            AttributeValue::CurrentChannel(channel) => {
                if !(11..=26).contains(&channel) {
                    debug!("PLME-SET.request: channel {} out of range", channel);
                    return PhyMsg::PlmeSetConfirm {
                        status: crate::phy::PhyStatus::InvalidParameter,
                        attribute,
                    };
                }
                (RadioParam::Channel, u32::from(channel))
            }
            AttributeValue::CcaMode(mode) => {
                // Only mode 1 (energy-above-threshold) is supported by the reference radio.
                if mode != 1 {
                    debug!("PLME-SET.request: unsupported CCA mode {}", mode);
                    return PhyMsg::PlmeSetConfirm {
                        status: crate::phy::PhyStatus::InvalidParameter,
                        attribute,
                    };
                }
                (RadioParam::CcaMode, u32::from(mode))
            }
            AttributeValue::TransmitPower(power) => (RadioParam::TxPower, u32::from(power)),
            // Read-only attributes were rejected above; this arm is unreachable.
            AttributeValue::ChannelsSupported(_)
            | AttributeValue::CurrentPage(_)
            | AttributeValue::MaxFrameDuration(_)
            | AttributeValue::ShrDuration(_)
            | AttributeValue::SymbolsPerOctet(_) => unreachable!("read-only attribute reached handle_set"),
        };

        let result = self.radio.set_value(param, raw);
        PhyMsg::PlmeSetConfirm { status: radio::result_to_status(result), attribute }
    }

    fn emit(&mut self, msg: PhyMsg, out: &mut ByteWriter<'_>) -> Result<(), Error> {
        let mut scratch = [0u8; queue::MAX_FRAME];
        let n = msg.encode(&mut scratch)?;
        let ts = self.now_timestamp();
        pcapng::write_epb(out, pcapng::IFACE_PHY, ts, &scratch[..n])
    }

    fn now_timestamp(&self) -> Timestamp {
        let raw = self.timer.now().raw_micros();
        Timestamp { seconds: raw / 1_000_000, micros: raw % 1_000_000 }
    }
}

/// Microseconds elapsed from `anchor` to `ts`, saturating at zero if `ts` precedes `anchor`.
fn elapsed_micros(anchor: Timestamp, ts: Timestamp) -> u32 {
    let anchor_total = u64::from(anchor.seconds) * 1_000_000 + u64::from(anchor.micros);
    let ts_total = u64::from(ts.seconds) * 1_000_000 + u64::from(ts.micros);
    ts_total.saturating_sub(anchor_total).min(u64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::ByteWriter;
    use crate::queue::{IndicationQueue, SimpleQueue};
    use crate::radio::{DriverResult, RadioObject, RadioParam, TxResult};

    struct MockTimer(u32);

    impl Timer for MockTimer {
        fn now(&self) -> Instant {
            Instant::from_raw_micros(self.0)
        }
    }

    impl Sleeper for MockTimer {
        fn sleep_coarse_ms(&mut self, millis: u32) {
            self.0 = self.0.wrapping_add(millis * 1_000);
        }

        fn sleep_fine_us(&mut self, micros: u32) {
            self.0 = self.0.wrapping_add(micros);
        }
    }

    #[derive(Default)]
    struct MockRadio {
        channel: u32,
        tx_power: u32,
        cca_mode: u32,
        pending_rx: Option<([u8; 4], u8)>,
    }

    impl RadioDriver for MockRadio {
        fn init(&mut self) -> DriverResult {
            self.channel = 26;
            DriverResult::Ok
        }

        fn send(&mut self, _psdu: &[u8]) -> TxResult {
            TxResult::Ok
        }

        fn channel_clear(&mut self) -> DriverResult {
            DriverResult::Idle
        }

        fn get_value(&mut self, param: RadioParam, value: &mut u32) -> DriverResult {
            *value = match param {
                RadioParam::Channel => self.channel,
                RadioParam::TxPower => self.tx_power,
                RadioParam::CcaMode => self.cca_mode,
                _ => return DriverResult::NotSupported,
            };
            DriverResult::Ok
        }

        fn set_value(&mut self, param: RadioParam, value: u32) -> DriverResult {
            match param {
                RadioParam::Channel => self.channel = value,
                RadioParam::TxPower => self.tx_power = value,
                RadioParam::CcaMode => self.cca_mode = value,
                RadioParam::PhyState => {}
                _ => return DriverResult::NotSupported,
            }
            DriverResult::Ok
        }

        fn get_object(&mut self, _object: RadioObject, _dst: &mut [u8]) -> DriverResult {
            DriverResult::NotSupported
        }

        fn poll_received(&mut self, psdu: &mut [u8]) -> Option<(usize, u8)> {
            let (frame, link_quality) = self.pending_rx.take()?;
            psdu[..frame.len()].copy_from_slice(&frame);
            Some((frame.len(), link_quality))
        }
    }

    struct TestConfig;

    impl Config for TestConfig {
        type Timer = MockTimer;
        type Radio = MockRadio;
    }

    fn wrap_epb(ts: Timestamp, primitive: &[u8]) -> heapless::Vec<u8, heapless::consts::U256> {
        let mut buf = [0u8; 256];
        let mut w = ByteWriter::new(&mut buf);
        pcapng::write_epb(&mut w, pcapng::IFACE_PHY, ts, primitive).unwrap();
        let written = 256 - w.into_rest().len();
        let mut v = heapless::Vec::new();
        v.extend_from_slice(&buf[..written]).unwrap();
        v
    }

    fn dispatch_primitive(
        disp: &mut Dispatcher<TestConfig, crate::queue::SimpleConsumer<'_>>,
        primitive: &[u8],
    ) -> heapless::Vec<u8, heapless::consts::U256> {
        let epb = wrap_epb(Timestamp { seconds: 0, micros: 0 }, primitive);
        let mut parser: pcapng::Parser<256> = pcapng::Parser::new();
        let mut event = None;
        for &b in epb.iter() {
            if let Some(ev) = parser.push(b) {
                event = Some((ev.block_type, ev.body.to_vec_heapless()));
            }
        }
        let (block_type, body) = event.expect("epb should have completed");
        let mut out_buf = [0u8; 256];
        let mut out = ByteWriter::new(&mut out_buf);
        let wrote = disp
            .handle_block(BlockEvent { block_type, body: &body }, &mut out)
            .unwrap();
        assert!(wrote, "expected a confirm to be written");
        let written = 256 - out.into_rest().len();
        let mut v = heapless::Vec::new();
        v.extend_from_slice(&out_buf[..written]).unwrap();
        v
    }

    trait ToVecHeapless {
        fn to_vec_heapless(&self) -> heapless::Vec<u8, heapless::consts::U256>;
    }

    impl ToVecHeapless for [u8] {
        fn to_vec_heapless(&self) -> heapless::Vec<u8, heapless::consts::U256> {
            let mut v = heapless::Vec::new();
            v.extend_from_slice(self).unwrap();
            v
        }
    }

    fn new_dispatcher() -> Dispatcher<TestConfig, crate::queue::SimpleConsumer<'static>> {
        static mut QUEUE: SimpleQueue = SimpleQueue::new();
        let (_, consumer) = unsafe { QUEUE.split() };
        let mut radio = MockRadio::default();
        radio.init();
        Dispatcher::new(radio, MockTimer(0), consumer)
    }

    #[test]
    fn s2_get_current_channel_round_trip() {
        let mut disp = new_dispatcher();
        let reply = dispatch_primitive(&mut disp, &[0x07, 0x03, 0x00]);
        let epb = EnhancedPacketBlock::parse(&reply[8..reply.len() - 4]).unwrap();
        assert_eq!(epb.data, &[0x08, 0x05, 0x00, 0x00, 0x1A]);
    }

    #[test]
    fn s3_set_then_get_current_channel() {
        let mut disp = new_dispatcher();
        let reply = dispatch_primitive(&mut disp, &[0x0B, 0x04, 0x00, 0x14]);
        let epb = EnhancedPacketBlock::parse(&reply[8..reply.len() - 4]).unwrap();
        assert_eq!(epb.data, &[0x0C, 0x04, 0x00, 0x00]);

        let reply = dispatch_primitive(&mut disp, &[0x07, 0x03, 0x00]);
        let epb = EnhancedPacketBlock::parse(&reply[8..reply.len() - 4]).unwrap();
        assert_eq!(epb.data, &[0x08, 0x05, 0x00, 0x00, 0x14]);
    }

    #[test]
    fn s4_set_read_only_attribute() {
        let mut disp = new_dispatcher();
        let reply = dispatch_primitive(&mut disp, &[0x0B, 0x07, 0x01, 0xDD, 0xCC, 0xBB, 0xAA]);
        let epb = EnhancedPacketBlock::parse(&reply[8..reply.len() - 4]).unwrap();
        assert_eq!(epb.data, &[0x0C, 0x04, 0x0B, 0x01]); // READ_ONLY = 0x0B
    }

    #[test]
    fn s5_pd_data_request_round_trip() {
        let mut disp = new_dispatcher();
        let reply = dispatch_primitive(&mut disp, &[0x00, 0x05, 0x02, 0xAA, 0xBB]);
        let epb = EnhancedPacketBlock::parse(&reply[8..reply.len() - 4]).unwrap();
        assert_eq!(epb.data, &[0x01, 0x03, 0x00]);
    }

    #[test]
    fn channel_boundaries() {
        let mut disp = new_dispatcher();
        let reply = dispatch_primitive(&mut disp, &[0x0B, 0x04, 0x00, 10]);
        let epb = EnhancedPacketBlock::parse(&reply[8..reply.len() - 4]).unwrap();
        assert_eq!(epb.data[2], crate::phy::PhyStatus::InvalidParameter as u8);

        let reply = dispatch_primitive(&mut disp, &[0x0B, 0x04, 0x00, 27]);
        let epb = EnhancedPacketBlock::parse(&reply[8..reply.len() - 4]).unwrap();
        assert_eq!(epb.data[2], crate::phy::PhyStatus::InvalidParameter as u8);

        let reply = dispatch_primitive(&mut disp, &[0x0B, 0x04, 0x00, 11]);
        let epb = EnhancedPacketBlock::parse(&reply[8..reply.len() - 4]).unwrap();
        assert_eq!(epb.data[2], crate::phy::PhyStatus::Success as u8);
    }

    #[test]
    fn poll_radio_emits_pd_data_indication() {
        static mut QUEUE: SimpleQueue = SimpleQueue::new();
        let (_, consumer) = unsafe { QUEUE.split() };
        let mut radio = MockRadio::default();
        radio.init();
        radio.pending_rx = Some(([0xDE, 0xAD, 0xBE, 0xEF], 200));
        let mut disp = Dispatcher::<TestConfig, _>::new(radio, MockTimer(0), consumer);

        let mut out_buf = [0u8; 64];
        let mut out = ByteWriter::new(&mut out_buf);
        let wrote = disp.poll_radio(&mut out).unwrap();
        assert!(wrote);
        let written = 64 - out.into_rest().len();
        let epb = EnhancedPacketBlock::parse(&out_buf[8..written - 4]).unwrap();
        assert_eq!(epb.data, &[0x02, 0x08, 0x04, 200, 0xDE, 0xAD, 0xBE, 0xEF]);

        // Nothing else pending: a second poll writes nothing.
        let mut out_buf = [0u8; 64];
        let mut out = ByteWriter::new(&mut out_buf);
        assert!(!disp.poll_radio(&mut out).unwrap());
    }

    #[test]
    fn unknown_primitive_is_dropped_without_a_confirm() {
        let mut disp = new_dispatcher();
        let epb = wrap_epb(Timestamp { seconds: 0, micros: 0 }, &[0xFF, 0x02]);
        let mut parser: pcapng::Parser<256> = pcapng::Parser::new();
        let mut body = None;
        for &b in epb.iter() {
            if let Some(ev) = parser.push(b) {
                body = Some(ev.body.to_vec_heapless());
            }
        }
        let body = body.unwrap();
        let mut out_buf = [0u8; 64];
        let mut out = ByteWriter::new(&mut out_buf);
        let wrote = disp
            .handle_block(
                BlockEvent { block_type: BlockType::EnhancedPacket, body: &body },
                &mut out,
            )
            .unwrap();
        assert!(!wrote);
    }
}
