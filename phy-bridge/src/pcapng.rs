//! PCAPNG block framing: an incremental byte-driven parser and three block writers (SHB, IDB,
//! EPB), used as a live capture envelope over the UART rather than as file storage.
//!
//! Every block on the wire is shaped as:
//!
//! ```text
//! block_type:u32 | block_total_length:u32 | body[...] | block_total_length:u32
//! ```
//!
//! `block_total_length` counts both length fields and is always a multiple of 4.

use crate::bytes::{ByteReader, ByteWriter};
use crate::Error;

/// `0x0A0D0D0A` — Section Header Block.
pub const BLOCK_TYPE_SHB: u32 = 0x0A0D_0D0A;
/// `0x00000001` — Interface Description Block.
pub const BLOCK_TYPE_IDB: u32 = 0x0000_0001;
/// `0x00000006` — Enhanced Packet Block.
pub const BLOCK_TYPE_EPB: u32 = 0x0000_0006;

/// `DLT_IEEE802_15_4_PHY`: EPB payloads on this interface are PHY SAP primitives.
pub const DLT_IEEE802_15_4_PHY: u16 = 147;
/// `DLT_IEEE802_15_4_NO_FCS`: EPB payloads on this interface are raw 802.15.4 frames, no FCS.
pub const DLT_IEEE802_15_4_NO_FCS: u16 = 230;

/// Interface index declared at startup for PHY SAP primitives.
pub const IFACE_PHY: u32 = 0;
/// Interface index declared at startup for raw 802.15.4 frames (reserved, unused by the core).
pub const IFACE_NO_FCS: u32 = 1;

const SHB_MAGIC: u32 = 0x1A2B_3C4D;

/// A PCAPNG timestamp split into seconds/microseconds halves.
///
/// This diverges from the PCAPNG norm of one 64-bit tick count; the split is a deliberate, and
/// load-bearing, domain convention that MUST be preserved for interop with the host tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub seconds: u32,
    pub micros: u32,
}

/// Writes a Section Header Block (28 octets) to `w`.
pub fn write_shb(w: &mut ByteWriter<'_>) -> Result<(), Error> {
    let total_len: u32 = 28;
    w.write_u32_le(BLOCK_TYPE_SHB)?;
    w.write_u32_le(total_len)?;
    w.write_u32_le(SHB_MAGIC)?;
    w.write_u16_le(1)?; // version_major
    w.write_u16_le(0)?; // version_minor
    w.write_i64_le(-1)?; // section_length: undefined
    w.write_u32_le(total_len)
}

/// Writes an Interface Description Block (20 octets) to `w`.
pub fn write_idb(w: &mut ByteWriter<'_>, linktype: u16, snaplen: u32) -> Result<(), Error> {
    let total_len: u32 = 20;
    w.write_u32_le(BLOCK_TYPE_IDB)?;
    w.write_u32_le(total_len)?;
    w.write_u16_le(linktype)?;
    w.write_u16_le(0)?; // reserved
    w.write_u32_le(snaplen)?;
    w.write_u32_le(total_len)
}

/// Writes an Enhanced Packet Block to `w`: fixed header, `data`, zero padding to 4-byte
/// alignment, then the trailing total-length field.
///
/// `captured_len` and `packet_len` are both set to `data.len()`; this crate never truncates a
/// captured frame.
pub fn write_epb(
    w: &mut ByteWriter<'_>,
    interface_id: u32,
    timestamp: Timestamp,
    data: &[u8],
) -> Result<(), Error> {
    let pad = (4 - (data.len() % 4)) % 4;
    let total_len: u32 = (8 + 20 + 4 + data.len() + pad) as u32;
    w.write_u32_le(BLOCK_TYPE_EPB)?;
    w.write_u32_le(total_len)?;
    w.write_u32_le(interface_id)?;
    w.write_u32_le(timestamp.seconds)?;
    w.write_u32_le(timestamp.micros)?;
    w.write_u32_le(data.len() as u32)?; // captured_len
    w.write_u32_le(data.len() as u32)?; // packet_len
    w.write_slice(data)?;
    for _ in 0..pad {
        w.write_u8(0)?;
    }
    w.write_u32_le(total_len)
}

/// A decoded Enhanced Packet Block.
#[derive(Debug, Clone, Copy)]
pub struct EnhancedPacketBlock<'a> {
    pub interface_id: u32,
    pub timestamp: Timestamp,
    pub captured_len: u32,
    pub packet_len: u32,
    pub data: &'a [u8],
}

impl<'a> EnhancedPacketBlock<'a> {
    /// Parses an EPB body (everything between the leading and trailing length fields) from `body`.
    pub fn parse(body: &'a [u8]) -> Result<Self, Error> {
        let mut r = ByteReader::new(body);
        let interface_id = r.read_u32_le()?;
        let seconds = r.read_u32_le()?;
        let micros = r.read_u32_le()?;
        let captured_len = r.read_u32_le()?;
        let packet_len = r.read_u32_le()?;
        if captured_len > packet_len {
            return Err(Error::InvalidValue);
        }
        let data = r.read_slice(captured_len as usize)?;
        Ok(Self {
            interface_id,
            timestamp: Timestamp { seconds, micros },
            captured_len,
            packet_len,
            data,
        })
    }
}

/// A recognized PCAPNG block type, tagging the event posted to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    SectionHeader,
    InterfaceDescription,
    EnhancedPacket,
}

impl BlockType {
    fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            BLOCK_TYPE_SHB => Some(BlockType::SectionHeader),
            BLOCK_TYPE_IDB => Some(BlockType::InterfaceDescription),
            BLOCK_TYPE_EPB => Some(BlockType::EnhancedPacket),
            _ => None,
        }
    }
}

/// An event posted by the incremental parser once a full block has been accumulated.
///
/// `block` borrows from the parser's internal buffer; the borrow must be consumed (decoded) before
/// the next byte is fed to the parser, since the buffer is reused for the next block.
#[derive(Debug, Clone, Copy)]
pub struct BlockEvent<'a> {
    pub block_type: BlockType,
    pub body: &'a [u8],
}

enum State {
    Idle,
    ReadBlock { block_type: BlockType, total_length: usize },
    /// A block with an unrecognized type or invalid length; its declared bytes are still consumed
    /// (to stay aligned with the stream) but no event is ever produced for it.
    Discard { total_length: usize },
}

/// Maximum block size the parser will accumulate: `snaplen + header(8) + trailing length(4) +
/// padding(3)`. Configurable by constructing with a smaller/larger backing buffer via
/// [`Parser::new`]; `N` is the backing array's capacity, fixed at compile time for `no_std`.
pub struct Parser<const N: usize> {
    state: State,
    buf: [u8; N],
    index: usize,
}

impl<const N: usize> Parser<N> {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            buf: [0; N],
            index: 0,
        }
    }

    /// Feeds one byte to the parser. Returns `Some(event)` once a full recognized block has been
    /// accumulated; the event borrows the parser's internal buffer and must be used before the
    /// next call to `push`.
    ///
    /// Overflow semantics: once a block's declared `total_length` exceeds the buffer, bytes beyond
    /// capacity are dropped but the index still advances until `total_length` is reached, at which
    /// point the (truncated) block is discarded as malformed. This uniform "truncate, still
    /// consume, then discard" behavior is deliberate: see the PHY dispatcher design notes.
    pub fn push(&mut self, byte: u8) -> Option<BlockEvent<'_>> {
        match self.state {
            State::Idle => {
                if self.index < N {
                    self.buf[self.index] = byte;
                }
                self.index += 1;

                if self.index == 8 {
                    let raw_type = u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
                    let total_length = u32::from_le_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]]);

                    // A malformed length can't be trusted to tell us how many bytes to discard;
                    // give up on alignment entirely and reset now.
                    if total_length % 4 != 0 {
                        debug!("pcapng: block length {} not a multiple of 4, resyncing", total_length);
                        self.reset();
                        return None;
                    }

                    let total_length = total_length as usize;
                    if total_length <= self.index {
                        // Nothing left to discard; already fully (mis-)consumed.
                        self.reset();
                        return None;
                    }

                    self.state = match BlockType::from_raw(raw_type) {
                        Some(block_type) if total_length >= 12 => State::ReadBlock { block_type, total_length },
                        _ => {
                            debug!("pcapng: discarding unrecognized block type {:#x}, length {}", raw_type, total_length);
                            State::Discard { total_length }
                        }
                    };
                }
                None
            }
            State::ReadBlock { block_type, total_length } => {
                if self.index < N {
                    self.buf[self.index] = byte;
                }
                self.index += 1;

                if self.index >= total_length {
                    let truncated = total_length > N;
                    let avail = self.index.min(N);
                    let event = if truncated {
                        warn!("pcapng: block of length {} exceeds buffer capacity {}, dropping", total_length, N);
                        None
                    } else {
                        Some(BlockEvent { block_type, body: &self.buf[8..avail - 4] })
                    };
                    // Header + body consumed; reset regardless so the next push starts fresh.
                    self.index = 0;
                    self.state = State::Idle;
                    return event;
                }
                None
            }
            State::Discard { total_length } => {
                // Bytes aren't stored, only counted, so a malformed block of any declared length
                // can be skipped without needing buffer space for it.
                self.index += 1;
                if self.index >= total_length {
                    self.reset();
                }
                None
            }
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.state = State::Idle;
    }
}

impl<const N: usize> Default for Parser<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed<const N: usize>(p: &mut Parser<N>, bytes: &[u8]) -> Option<(BlockType, heapless::Vec<u8, heapless::consts::U256>)> {
        let mut last = None;
        for &b in bytes {
            if let Some(ev) = p.push(b) {
                let mut v = heapless::Vec::new();
                v.extend_from_slice(ev.body).unwrap();
                last = Some((ev.block_type, v));
            }
        }
        last
    }

    #[test]
    fn shb_round_trip() {
        let mut buf = [0u8; 28];
        write_shb(&mut ByteWriter::new(&mut buf)).unwrap();
        assert_eq!(&buf[0..8], &[0x0A, 0x0D, 0x0D, 0x0A, 0x1C, 0x00, 0x00, 0x00]);

        let mut p: Parser<64> = Parser::new();
        let ev = feed(&mut p, &buf).expect("shb should complete");
        assert_eq!(ev.0, BlockType::SectionHeader);
    }

    #[test]
    fn idb_phy_matches_wire_frame() {
        let mut buf = [0u8; 20];
        write_idb(&mut ByteWriter::new(&mut buf), DLT_IEEE802_15_4_PHY, 128).unwrap();
        assert_eq!(
            buf,
            [0x01, 0x00, 0x00, 0x00, 0x14, 0x00, 0x00, 0x00, 0x93, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00, 0x14, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn epb_padding_is_zeroed() {
        let mut buf = [0u8; 64];
        let data = [1, 2, 3, 4, 5]; // needs 3 bytes of padding
        let n = {
            let mut w = ByteWriter::new(&mut buf);
            write_epb(&mut w, 0, Timestamp { seconds: 1, micros: 2 }, &data).unwrap();
            64 - w.into_rest().len()
        };
        let total_len = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        assert_eq!(total_len as usize, n);
        assert_eq!(total_len % 4, 0);
        // fixed header is 28 bytes; data at offset 28..33, padding at 33..36
        assert_eq!(&buf[33..36], &[0, 0, 0]);
    }

    #[test]
    fn unknown_block_type_is_silently_discarded() {
        let bytes = [0xDE, 0xAD, 0xBE, 0xEF, 0x0C, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        let mut p: Parser<64> = Parser::new();
        let ev = feed(&mut p, &bytes);
        assert!(ev.is_none());
        assert_eq!(p.index, 0);
    }

    #[test]
    fn epb_interface_id_and_timestamp_split_preserved() {
        let mut buf = [0u8; 64];
        let data = [0xAAu8; 4];
        let mut w = ByteWriter::new(&mut buf);
        write_epb(&mut w, IFACE_PHY, Timestamp { seconds: 12, micros: 500 }, &data).unwrap();
        drop(w);

        let mut p: Parser<64> = Parser::new();
        let (ty, body) = feed(&mut p, &buf[..36]).expect("epb should complete");
        assert_eq!(ty, BlockType::EnhancedPacket);
        let epb = EnhancedPacketBlock::parse(&body).unwrap();
        assert_eq!(epb.interface_id, IFACE_PHY);
        assert_eq!(epb.timestamp.seconds, 12);
        assert_eq!(epb.timestamp.micros, 500);
        assert_eq!(epb.captured_len, epb.packet_len);
    }
}
