//! The IEEE 802.15.4 PHY service primitive codec and PHY Information Base (PIB).
//!
//! A [`PhyMsg`] is the in-memory representation of one PD-SAP/PLME-SAP primitive, carried as the
//! payload of an Enhanced Packet Block on interface 0 (see [`crate::pcapng`]). [`PhyMsg::decode`]
//! and [`PhyMsg::encode`] implement the wire format tabled in the PHY service primitive encoding
//! design (type/length header, one body shape per primitive).

use crate::bytes::{ByteReader, ByteWriter, FromBytes, ToBytes};
use crate::Error;

/// `aMaxPHYPacketSize`: the largest PSDU the PHY will transport.
pub const MAX_PSDU: usize = 127;

/// A PHY Service Data Unit, stack-allocated up to [`MAX_PSDU`] octets.
#[derive(Clone, Copy)]
pub struct Psdu {
    length: u8,
    data: [u8; MAX_PSDU],
}

impl Psdu {
    /// Builds a `Psdu` from a slice, which must be no longer than [`MAX_PSDU`].
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() > MAX_PSDU {
            return Err(Error::InvalidLength);
        }
        let mut data = [0; MAX_PSDU];
        data[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            length: bytes.len() as u8,
            data,
        })
    }

    /// Returns the PSDU contents as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..usize::from(self.length)]
    }

    /// Returns the PSDU length in octets.
    pub fn len(&self) -> u8 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl PartialEq for Psdu {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl core::fmt::Debug for Psdu {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Psdu").field("data", &self.as_slice()).finish()
    }
}

/// PHY PIB attribute identifiers (`phy_pib_attr`).
///
/// Discriminants match declaration order in the reference PHY service implementation, which is
/// also the order the attribute-width table in the PHY primitive encoding design is indexed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PhyAttribute {
    CurrentChannel = 0,
    ChannelsSupported = 1,
    TransmitPower = 2,
    CcaMode = 3,
    CurrentPage = 4,
    MaxFrameDuration = 5,
    ShrDuration = 6,
    SymbolsPerOctet = 7,
}

impl PhyAttribute {
    /// Recovers a `PhyAttribute` from its wire value, or `None` if unrecognized.
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => PhyAttribute::CurrentChannel,
            1 => PhyAttribute::ChannelsSupported,
            2 => PhyAttribute::TransmitPower,
            3 => PhyAttribute::CcaMode,
            4 => PhyAttribute::CurrentPage,
            5 => PhyAttribute::MaxFrameDuration,
            6 => PhyAttribute::ShrDuration,
            7 => PhyAttribute::SymbolsPerOctet,
            _ => return None,
        })
    }

    /// Width in octets of this attribute's value on the wire.
    pub fn value_width(&self) -> usize {
        match self {
            PhyAttribute::CurrentChannel => 1,
            PhyAttribute::ChannelsSupported => 4,
            PhyAttribute::TransmitPower => 1,
            PhyAttribute::CcaMode => 1,
            PhyAttribute::CurrentPage => 1,
            PhyAttribute::MaxFrameDuration => 2,
            PhyAttribute::ShrDuration => 1,
            PhyAttribute::SymbolsPerOctet => 1,
        }
    }

    /// Whether SET is always rejected with `READ_ONLY` for this attribute.
    pub fn is_read_only(&self) -> bool {
        !matches!(self, PhyAttribute::CurrentChannel | PhyAttribute::TransmitPower | PhyAttribute::CcaMode)
    }
}

/// A decoded PIB attribute value, tagged by which attribute it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeValue {
    CurrentChannel(u8),
    ChannelsSupported(u32),
    TransmitPower(u8),
    CcaMode(u8),
    CurrentPage(u8),
    MaxFrameDuration(u16),
    ShrDuration(u8),
    SymbolsPerOctet(u8),
}

impl AttributeValue {
    pub fn attribute(&self) -> PhyAttribute {
        match self {
            AttributeValue::CurrentChannel(_) => PhyAttribute::CurrentChannel,
            AttributeValue::ChannelsSupported(_) => PhyAttribute::ChannelsSupported,
            AttributeValue::TransmitPower(_) => PhyAttribute::TransmitPower,
            AttributeValue::CcaMode(_) => PhyAttribute::CcaMode,
            AttributeValue::CurrentPage(_) => PhyAttribute::CurrentPage,
            AttributeValue::MaxFrameDuration(_) => PhyAttribute::MaxFrameDuration,
            AttributeValue::ShrDuration(_) => PhyAttribute::ShrDuration,
            AttributeValue::SymbolsPerOctet(_) => PhyAttribute::SymbolsPerOctet,
        }
    }

    fn to_bytes(&self, w: &mut ByteWriter<'_>) -> Result<(), Error> {
        match *self {
            AttributeValue::CurrentChannel(v) => w.write_u8(v),
            AttributeValue::ChannelsSupported(v) => w.write_u32_le(v),
            AttributeValue::TransmitPower(v) => w.write_u8(v),
            AttributeValue::CcaMode(v) => w.write_u8(v),
            AttributeValue::CurrentPage(v) => w.write_u8(v),
            AttributeValue::MaxFrameDuration(v) => w.write_u16_le(v),
            AttributeValue::ShrDuration(v) => w.write_u8(v),
            AttributeValue::SymbolsPerOctet(v) => w.write_u8(v),
        }
    }

    fn from_bytes(attr: PhyAttribute, r: &mut ByteReader<'_>) -> Result<Self, Error> {
        Ok(match attr {
            PhyAttribute::CurrentChannel => AttributeValue::CurrentChannel(r.read_u8()?),
            PhyAttribute::ChannelsSupported => AttributeValue::ChannelsSupported(r.read_u32_le()?),
            PhyAttribute::TransmitPower => AttributeValue::TransmitPower(r.read_u8()?),
            PhyAttribute::CcaMode => AttributeValue::CcaMode(r.read_u8()?),
            PhyAttribute::CurrentPage => AttributeValue::CurrentPage(r.read_u8()?),
            PhyAttribute::MaxFrameDuration => AttributeValue::MaxFrameDuration(r.read_u16_le()?),
            PhyAttribute::ShrDuration => AttributeValue::ShrDuration(r.read_u8()?),
            PhyAttribute::SymbolsPerOctet => AttributeValue::SymbolsPerOctet(r.read_u8()?),
        })
    }
}

/// PHY status codes carried in confirm primitives.
///
/// The reference implementation's internal `phy_state` enum is numbered relative to an unrelated
/// message-type enum and is not suitable as a wire value (it would put `SUCCESS` at 14). This
/// crate defines its own compact wire encoding, with `SUCCESS = 0`, matching the worked GET/SET
/// round-trip examples in the PHY dispatcher's test scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PhyStatus {
    Success = 0,
    RxOn = 1,
    TxOn = 2,
    TrxOff = 3,
    ForceTrxOff = 4,
    Idle = 5,
    Busy = 6,
    BusyRx = 7,
    BusyTx = 8,
    InvalidParameter = 9,
    UnsupportAttribute = 10,
    ReadOnly = 11,
}

impl PhyStatus {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => PhyStatus::Success,
            1 => PhyStatus::RxOn,
            2 => PhyStatus::TxOn,
            3 => PhyStatus::TrxOff,
            4 => PhyStatus::ForceTrxOff,
            5 => PhyStatus::Idle,
            6 => PhyStatus::Busy,
            7 => PhyStatus::BusyRx,
            8 => PhyStatus::BusyTx,
            9 => PhyStatus::InvalidParameter,
            10 => PhyStatus::UnsupportAttribute,
            11 => PhyStatus::ReadOnly,
            _ => return None,
        })
    }
}

/// Wire type tags for the 13 PD-SAP / PLME-SAP primitives carried on interface 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PrimitiveType {
    PdDataRequest = 0,
    PdDataConfirm = 1,
    PdDataIndication = 2,
    PlmeCcaRequest = 3,
    PlmeCcaConfirm = 4,
    PlmeEdRequest = 5,
    PlmeEdConfirm = 6,
    PlmeGetRequest = 7,
    PlmeGetConfirm = 8,
    PlmeSetTrxStateRequest = 9,
    PlmeSetTrxStateConfirm = 10,
    PlmeSetRequest = 11,
    PlmeSetConfirm = 12,
}

/// A decoded PHY service primitive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhyMsg {
    PdDataRequest { psdu: Psdu },
    PdDataConfirm { status: PhyStatus },
    PdDataIndication { psdu: Psdu, ppdu_link_quality: u8 },
    PlmeCcaRequest,
    PlmeCcaConfirm { status: PhyStatus },
    PlmeEdRequest,
    PlmeEdConfirm { status: PhyStatus, energy_level: u8 },
    PlmeGetRequest { attribute: u8 },
    PlmeGetConfirm {
        status: PhyStatus,
        attribute: u8,
        value: Option<AttributeValue>,
    },
    PlmeSetTrxStateRequest { state: PhyStatus },
    PlmeSetTrxStateConfirm { status: PhyStatus },
    PlmeSetRequest { value: AttributeValue },
    PlmeSetConfirm { status: PhyStatus, attribute: u8 },
}

impl PhyMsg {
    /// The on-wire byte count of the full primitive, including the 2-byte header.
    pub fn wire_len(&self) -> usize {
        2 + match self {
            PhyMsg::PdDataRequest { psdu } => 1 + usize::from(psdu.len()),
            PhyMsg::PdDataConfirm { .. } => 1,
            PhyMsg::PdDataIndication { psdu, .. } => 2 + usize::from(psdu.len()),
            PhyMsg::PlmeCcaRequest => 0,
            PhyMsg::PlmeCcaConfirm { .. } => 1,
            PhyMsg::PlmeEdRequest => 0,
            PhyMsg::PlmeEdConfirm { .. } => 2,
            PhyMsg::PlmeGetRequest { .. } => 1,
            PhyMsg::PlmeGetConfirm { value, .. } => {
                2 + (*value).map(|v| v.attribute().value_width()).unwrap_or(0)
            }
            PhyMsg::PlmeSetTrxStateRequest { .. } => 1,
            PhyMsg::PlmeSetTrxStateConfirm { .. } => 1,
            PhyMsg::PlmeSetRequest { value } => 1 + value.attribute().value_width(),
            PhyMsg::PlmeSetConfirm { .. } => 2,
        }
    }

    /// Encodes `self` into `buf`, returning the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let len = self.wire_len();
        let mut w = ByteWriter::new(buf);
        w.write_u8(self.primitive_type() as u8)?;
        w.write_u8(len as u8)?;
        match self {
            PhyMsg::PdDataRequest { psdu } => {
                w.write_u8(psdu.len())?;
                w.write_slice(psdu.as_slice())?;
            }
            PhyMsg::PdDataConfirm { status } => w.write_u8(*status as u8)?,
            PhyMsg::PdDataIndication { psdu, ppdu_link_quality } => {
                w.write_u8(psdu.len())?;
                w.write_u8(*ppdu_link_quality)?;
                w.write_slice(psdu.as_slice())?;
            }
            PhyMsg::PlmeCcaRequest | PhyMsg::PlmeEdRequest => {}
            PhyMsg::PlmeCcaConfirm { status } => w.write_u8(*status as u8)?,
            PhyMsg::PlmeEdConfirm { status, energy_level } => {
                w.write_u8(*status as u8)?;
                w.write_u8(*energy_level)?;
            }
            PhyMsg::PlmeGetRequest { attribute } => w.write_u8(*attribute)?,
            PhyMsg::PlmeGetConfirm { status, attribute, value } => {
                w.write_u8(*status as u8)?;
                w.write_u8(*attribute)?;
                if let Some(v) = value {
                    v.to_bytes(&mut w)?;
                }
            }
            PhyMsg::PlmeSetTrxStateRequest { state } => w.write_u8(*state as u8)?,
            PhyMsg::PlmeSetTrxStateConfirm { status } => w.write_u8(*status as u8)?,
            PhyMsg::PlmeSetRequest { value } => {
                w.write_u8(value.attribute() as u8)?;
                value.to_bytes(&mut w)?;
            }
            PhyMsg::PlmeSetConfirm { status, attribute } => {
                w.write_u8(*status as u8)?;
                w.write_u8(*attribute)?;
            }
        }
        Ok(len)
    }

    fn primitive_type(&self) -> PrimitiveType {
        match self {
            PhyMsg::PdDataRequest { .. } => PrimitiveType::PdDataRequest,
            PhyMsg::PdDataConfirm { .. } => PrimitiveType::PdDataConfirm,
            PhyMsg::PdDataIndication { .. } => PrimitiveType::PdDataIndication,
            PhyMsg::PlmeCcaRequest => PrimitiveType::PlmeCcaRequest,
            PhyMsg::PlmeCcaConfirm { .. } => PrimitiveType::PlmeCcaConfirm,
            PhyMsg::PlmeEdRequest => PrimitiveType::PlmeEdRequest,
            PhyMsg::PlmeEdConfirm { .. } => PrimitiveType::PlmeEdConfirm,
            PhyMsg::PlmeGetRequest { .. } => PrimitiveType::PlmeGetRequest,
            PhyMsg::PlmeGetConfirm { .. } => PrimitiveType::PlmeGetConfirm,
            PhyMsg::PlmeSetTrxStateRequest { .. } => PrimitiveType::PlmeSetTrxStateRequest,
            PhyMsg::PlmeSetTrxStateConfirm { .. } => PrimitiveType::PlmeSetTrxStateConfirm,
            PhyMsg::PlmeSetRequest { .. } => PrimitiveType::PlmeSetRequest,
            PhyMsg::PlmeSetConfirm { .. } => PrimitiveType::PlmeSetConfirm,
        }
    }

    /// Decodes a `PhyMsg` from `bytes`, returning the number of bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), Error> {
        let mut r = ByteReader::new(bytes);
        let ty = r.read_u8()?;
        let length = r.read_u8()?;
        if usize::from(length) > bytes.len() {
            return Err(Error::Eof);
        }

        let msg = match ty {
            0 => {
                let psdu_len = r.read_u8()?;
                let data = r.read_slice(usize::from(psdu_len))?;
                PhyMsg::PdDataRequest { psdu: Psdu::from_slice(data)? }
            }
            1 => PhyMsg::PdDataConfirm { status: read_status(&mut r)? },
            2 => {
                let psdu_len = r.read_u8()?;
                let ppdu_link_quality = r.read_u8()?;
                let data = r.read_slice(usize::from(psdu_len))?;
                PhyMsg::PdDataIndication { psdu: Psdu::from_slice(data)?, ppdu_link_quality }
            }
            3 => PhyMsg::PlmeCcaRequest,
            4 => PhyMsg::PlmeCcaConfirm { status: read_status(&mut r)? },
            5 => PhyMsg::PlmeEdRequest,
            6 => {
                let status = read_status(&mut r)?;
                let energy_level = r.read_u8()?;
                PhyMsg::PlmeEdConfirm { status, energy_level }
            }
            7 => PhyMsg::PlmeGetRequest { attribute: r.read_u8()? },
            8 => {
                let status = read_status(&mut r)?;
                let attribute = r.read_u8()?;
                let value = match PhyAttribute::from_u8(attribute) {
                    Some(attr) => Some(AttributeValue::from_bytes(attr, &mut r)?),
                    None => None,
                };
                PhyMsg::PlmeGetConfirm { status, attribute, value }
            }
            9 => PhyMsg::PlmeSetTrxStateRequest { state: read_status(&mut r)? },
            10 => PhyMsg::PlmeSetTrxStateConfirm { status: read_status(&mut r)? },
            11 => {
                let attribute = r.read_u8()?;
                let attr = PhyAttribute::from_u8(attribute).ok_or(Error::UnknownAttribute)?;
                PhyMsg::PlmeSetRequest { value: AttributeValue::from_bytes(attr, &mut r)? }
            }
            12 => {
                let status = read_status(&mut r)?;
                let attribute = r.read_u8()?;
                PhyMsg::PlmeSetConfirm { status, attribute }
            }
            _ => return Err(Error::UnknownPrimitiveType),
        };

        let consumed = bytes.len() - r.bytes_left();
        if consumed != usize::from(length) {
            return Err(Error::IncompleteParse);
        }
        Ok((msg, consumed))
    }
}

fn read_status(r: &mut ByteReader<'_>) -> Result<PhyStatus, Error> {
    PhyStatus::from_u8(r.read_u8()?).ok_or(Error::InvalidValue)
}

/// The process-wide PHY Information Base: the set of attributes readable/writable on the PHY.
///
/// This is a *view* of the radio driver's authoritative parameters, not a cache: GET always reads
/// through to the driver (see [`crate::radio::RadioDriver`]); only the read-only constants fixed
/// by this PHY's capabilities are stored here directly.
#[derive(Debug, Clone, Copy)]
pub struct Pib {
    /// Fixed bit-vector of supported channels (11..=26 set for 2.4 GHz O-QPSK).
    pub channels_supported: u32,
    pub max_frame_duration: u16,
    pub shr_duration: u8,
    pub symbols_per_octet: u8,
    pub current_page: u8,
}

impl Default for Pib {
    fn default() -> Self {
        Self {
            channels_supported: 0x07FF_F800, // channels 11..=26
            max_frame_duration: 266,
            shr_duration: 10,
            symbols_per_octet: 2,
            current_page: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_get_confirm_current_channel() {
        let msg = PhyMsg::PlmeGetConfirm {
            status: PhyStatus::Success,
            attribute: 0,
            value: Some(AttributeValue::CurrentChannel(26)),
        };
        let mut buf = [0u8; 16];
        let n = msg.encode(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x08, 0x05, 0x00, 0x00, 0x1A]);

        let (decoded, consumed) = PhyMsg::decode(&buf[..n]).unwrap();
        assert_eq!(consumed, n);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn round_trip_set_request_current_channel() {
        let msg = PhyMsg::PlmeSetRequest { value: AttributeValue::CurrentChannel(20) };
        let mut buf = [0u8; 16];
        let n = msg.encode(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x0B, 0x04, 0x00, 0x14]);
        let (decoded, _) = PhyMsg::decode(&buf[..n]).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn set_request_unknown_attribute_is_error() {
        let bad = [0x0B, 0x04, 0xEE, 0x00];
        assert_eq!(PhyMsg::decode(&bad), Err(Error::UnknownAttribute));
    }

    #[test]
    fn set_request_channels_supported_is_encodable_but_policy_rejects_it_elsewhere() {
        // The codec itself has no read-only policy; that lives in the dispatcher (S4).
        let msg = PhyMsg::PlmeSetRequest { value: AttributeValue::ChannelsSupported(0xAABBCCDD) };
        let mut buf = [0u8; 16];
        let n = msg.encode(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x0B, 0x07, 0x01, 0xDD, 0xCC, 0xBB, 0xAA]);
    }

    #[test]
    fn pd_data_request_round_trip() {
        let msg = PhyMsg::PdDataRequest { psdu: Psdu::from_slice(&[0xAA, 0xBB]).unwrap() };
        let mut buf = [0u8; 16];
        let n = msg.encode(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x00, 0x05, 0x02, 0xAA, 0xBB]);
    }

    #[test]
    fn pd_data_request_zero_length_psdu() {
        let msg = PhyMsg::PdDataRequest { psdu: Psdu::from_slice(&[]).unwrap() };
        let mut buf = [0u8; 16];
        let n = msg.encode(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x00, 0x03, 0x00]);
    }

    #[test]
    fn pd_data_request_max_length_psdu() {
        let data = [0x5Au8; MAX_PSDU];
        let msg = PhyMsg::PdDataRequest { psdu: Psdu::from_slice(&data).unwrap() };
        let mut buf = [0u8; MAX_PSDU + 3];
        let n = msg.encode(&mut buf).unwrap();
        assert_eq!(n, MAX_PSDU + 3);
    }

    #[test]
    fn psdu_over_max_length_rejected() {
        let data = [0u8; MAX_PSDU + 1];
        assert_eq!(Psdu::from_slice(&data), Err(Error::InvalidLength));
    }
}
