//! Canonical wire format for reporter↔collector datagrams.
//!
//! Every datagram carries exactly one frame. All frames share a common
//! 8-byte header:
//!
//! ```text
//! ┌─────────┬─────────┬─────────┬───────────────────────────────────┐
//! │ Type(1) │ Flags(1)│ Len(2)  │ Node ID (4)                       │
//! └─────────┴─────────┴─────────┴───────────────────────────────────┘
//! ```
//!
//! Frame types:
//! - 0x01 = REPORT (reporter → collector): parent address + current reading
//! - 0x02 = READING (reporter → collector): one buffered reading
//! - 0x03 = ACK (collector → reporter): per-node update count
//!
//! All integers are little-endian. The length field must match both the
//! datagram length and the fixed size of the frame type; anything else is
//! rejected before it can touch receiver state. There is no versioning and
//! no multi-frame batching beyond datagram boundaries.

use std::fmt;
use std::net::Ipv6Addr;

use thiserror::Error;

/// Common header size for all frames.
pub const HEADER_SIZE: usize = 8;

/// Total size of a REPORT frame (header + 16-byte parent + u32 reading).
pub const REPORT_SIZE: usize = HEADER_SIZE + 16 + 4;

/// Total size of a READING frame (header + u32 value).
pub const READING_SIZE: usize = HEADER_SIZE + 4;

/// Total size of an ACK frame (header + u32 update count).
pub const ACK_SIZE: usize = HEADER_SIZE + 4;

/// Largest frame the protocol ever produces.
pub const MAX_FRAME_SIZE: usize = REPORT_SIZE;

/// Frame type discriminants.
pub mod frame_type {
    pub const REPORT: u8 = 0x01;
    pub const READING: u8 = 0x02;
    pub const ACK: u8 = 0x03;
}

/// Header flag bits.
pub mod flags {
    /// The reading was replayed from the reporter's local buffer after a
    /// period of unreachability.
    pub const BATCHED: u8 = 0x01;
}

/// Identity of a reporting node.
///
/// Randomly generated at reporter startup (or pinned via configuration) and
/// carried in every frame header. This is the canonical identity; the UDP
/// source address is only used for replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// Generates a new random node ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(rand::random())
    }

    /// Raw value for wire serialization.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for NodeId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// REPORT frame: a node's current state.
///
/// ```text
/// ┌──────────────────────────────────────────────────────────────────┐
/// │ Header: Type=0x01, Node ID                                       │
/// ├──────────────────────────────────────────────────────────────────┤
/// │ Parent address (16 bytes, `::` when no parent is known)          │
/// ├──────────────────────────────────────────────────────────────────┤
/// │ Reading (4 bytes)                                                │
/// └──────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportFrame {
    /// Reporting node.
    pub node: NodeId,
    /// The node's current preferred routing parent, if any.
    pub parent: Option<Ipv6Addr>,
    /// Current sensor reading.
    pub reading: u32,
}

/// READING frame: a single reading, used when replaying the local buffer.
///
/// ```text
/// ┌──────────────────────────────────────────────────────────────────┐
/// │ Header: Type=0x02, Flags may carry BATCHED, Node ID              │
/// ├──────────────────────────────────────────────────────────────────┤
/// │ Value (4 bytes)                                                  │
/// └──────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadingFrame {
    /// Reporting node.
    pub node: NodeId,
    /// The reading value.
    pub value: u32,
    /// Whether this reading was replayed from the local buffer.
    pub batched: bool,
}

/// ACK frame: collector acknowledgment of a valid frame.
///
/// ```text
/// ┌──────────────────────────────────────────────────────────────────┐
/// │ Header: Type=0x03, Node ID (echo)                                │
/// ├──────────────────────────────────────────────────────────────────┤
/// │ Update count for that node (4 bytes)                             │
/// └──────────────────────────────────────────────────────────────────┘
/// ```
///
/// Any ack doubles as the reporter's reachability signal: receiving one
/// marks the collector reachable and triggers a buffer flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckFrame {
    /// The node being acknowledged.
    pub node: NodeId,
    /// How many updates the collector has applied for that node.
    pub updates: u32,
}

/// All frame variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Report(ReportFrame),
    Reading(ReadingFrame),
    Ack(AckFrame),
}

/// Errors during frame encode/decode.
#[derive(Debug, Error)]
pub enum WireError {
    /// Buffer too small to decode frame.
    #[error("buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },
    /// Unknown frame type.
    #[error("unknown frame type: 0x{0:02x}")]
    UnknownFrameType(u8),
    /// Header length field doesn't match the datagram.
    #[error("frame length mismatch: header says {header}, datagram is {actual}")]
    LengthMismatch { header: usize, actual: usize },
    /// Datagram length doesn't match the fixed size for the frame type.
    #[error("wrong length for frame type 0x{frame_type:02x}: expected {expected}, got {actual}")]
    WrongLength {
        frame_type: u8,
        expected: usize,
        actual: usize,
    },
}

/// Writer for encoding frames.
struct FrameWriter<'a> {
    buf: &'a mut Vec<u8>,
}

impl<'a> FrameWriter<'a> {
    fn new(buf: &'a mut Vec<u8>) -> Self {
        buf.clear();
        Self { buf }
    }

    fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_addr(&mut self, addr: Ipv6Addr) {
        self.buf.extend_from_slice(&addr.octets());
    }

    /// Write header and return position of length field for patching.
    fn write_header(&mut self, frame_type: u8, flags: u8, node: NodeId) -> usize {
        self.put_u8(frame_type);
        self.put_u8(flags);
        let len_pos = self.buf.len();
        self.put_u16(0); // placeholder for length
        self.put_u32(node.as_u32());
        len_pos
    }

    /// Patch the length field after writing payload.
    fn patch_length(&mut self, len_pos: usize) {
        let total_len = self.buf.len();
        let len_bytes = (total_len as u16).to_le_bytes();
        self.buf[len_pos] = len_bytes[0];
        self.buf[len_pos + 1] = len_bytes[1];
    }
}

/// Reader for decoding frames.
struct FrameReader<'a> {
    buf: &'a [u8],
    cursor: usize,
}

impl<'a> FrameReader<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, cursor: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.cursor
    }

    fn take_u8(&mut self) -> Result<u8, WireError> {
        if self.remaining() < 1 {
            return Err(WireError::BufferTooSmall {
                need: 1,
                have: self.remaining(),
            });
        }
        let v = self.buf[self.cursor];
        self.cursor += 1;
        Ok(v)
    }

    fn take_u16(&mut self) -> Result<u16, WireError> {
        if self.remaining() < 2 {
            return Err(WireError::BufferTooSmall {
                need: 2,
                have: self.remaining(),
            });
        }
        let mut arr = [0u8; 2];
        arr.copy_from_slice(&self.buf[self.cursor..self.cursor + 2]);
        self.cursor += 2;
        Ok(u16::from_le_bytes(arr))
    }

    fn take_u32(&mut self) -> Result<u32, WireError> {
        if self.remaining() < 4 {
            return Err(WireError::BufferTooSmall {
                need: 4,
                have: self.remaining(),
            });
        }
        let mut arr = [0u8; 4];
        arr.copy_from_slice(&self.buf[self.cursor..self.cursor + 4]);
        self.cursor += 4;
        Ok(u32::from_le_bytes(arr))
    }

    fn take_addr(&mut self) -> Result<Ipv6Addr, WireError> {
        if self.remaining() < 16 {
            return Err(WireError::BufferTooSmall {
                need: 16,
                have: self.remaining(),
            });
        }
        let mut arr = [0u8; 16];
        arr.copy_from_slice(&self.buf[self.cursor..self.cursor + 16]);
        self.cursor += 16;
        Ok(Ipv6Addr::from(arr))
    }
}

/// Encode a frame into the buffer.
///
/// The buffer is cleared and reused (preserves capacity).
pub fn encode_frame(frame: &Frame, buf: &mut Vec<u8>) {
    let mut w = FrameWriter::new(buf);

    match frame {
        Frame::Report(f) => {
            let len_pos = w.write_header(frame_type::REPORT, 0, f.node);
            w.put_addr(f.parent.unwrap_or(Ipv6Addr::UNSPECIFIED));
            w.put_u32(f.reading);
            w.patch_length(len_pos);
        }
        Frame::Reading(f) => {
            let frame_flags = if f.batched { flags::BATCHED } else { 0 };
            let len_pos = w.write_header(frame_type::READING, frame_flags, f.node);
            w.put_u32(f.value);
            w.patch_length(len_pos);
        }
        Frame::Ack(f) => {
            let len_pos = w.write_header(frame_type::ACK, 0, f.node);
            w.put_u32(f.updates);
            w.patch_length(len_pos);
        }
    }
}

/// Decode a frame from one datagram's bytes.
///
/// # Errors
///
/// Returns a [`WireError`] when the bytes are not exactly one well-formed
/// frame; callers discard the datagram and log.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, WireError> {
    let mut r = FrameReader::new(bytes);

    // Read header
    let frame_type = r.take_u8()?;
    let frame_flags = r.take_u8()?;
    let len = usize::from(r.take_u16()?);
    let node = NodeId::from(r.take_u32()?);

    if len != bytes.len() {
        return Err(WireError::LengthMismatch {
            header: len,
            actual: bytes.len(),
        });
    }

    match frame_type {
        frame_type::REPORT => {
            expect_len(frame_type, REPORT_SIZE, bytes.len())?;
            let addr = r.take_addr()?;
            let reading = r.take_u32()?;
            let parent = if addr.is_unspecified() {
                None
            } else {
                Some(addr)
            };
            Ok(Frame::Report(ReportFrame {
                node,
                parent,
                reading,
            }))
        }
        frame_type::READING => {
            expect_len(frame_type, READING_SIZE, bytes.len())?;
            let value = r.take_u32()?;
            Ok(Frame::Reading(ReadingFrame {
                node,
                value,
                batched: frame_flags & flags::BATCHED != 0,
            }))
        }
        frame_type::ACK => {
            expect_len(frame_type, ACK_SIZE, bytes.len())?;
            let updates = r.take_u32()?;
            Ok(Frame::Ack(AckFrame { node, updates }))
        }
        other => Err(WireError::UnknownFrameType(other)),
    }
}

/// Enforce the fixed datagram size for a frame type.
fn expect_len(frame_type: u8, expected: usize, actual: usize) -> Result<(), WireError> {
    if actual == expected {
        Ok(())
    } else {
        Err(WireError::WrongLength {
            frame_type,
            expected,
            actual,
        })
    }
}
