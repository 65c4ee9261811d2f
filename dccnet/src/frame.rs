//! Wire-format definitions for protocol frames.
//!
//! Every unit exchanged between peers is a [`Frame`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (sync markers, header fields, payload).
//! - Serialising a [`Frame`] into a sealed byte buffer ready for the channel.
//! - Deserialising the front of a byte buffer back into a [`Frame`], reporting
//!   whether more bytes are needed or the bytes are malformed.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      SYNC (0xDCC023C2)                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      SYNC (0xDCC023C2)                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           Checksum            |        Payload Length         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      ID       |     Flags     |        Payload ...            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 14 bytes.
//! sync(4) + sync(4) + checksum(2) + length(2) + id(1) + flags(1)

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::checksum::internet_checksum;

/// Bit-flag constants for the `flags` header field.
pub mod flags {
    /// Acknowledges the data frame carrying the same id.
    pub const ACK: u8 = 0b1000_0000;
    /// Last data frame of the sender's stream.
    pub const END: u8 = 0b0100_0000;
    /// Abort the connection.
    pub const RST: u8 = 0b0010_0000;
}

/// Synchronisation marker, written twice at the start of every frame.
pub const SYNC: u32 = 0xDCC0_23C2;

/// Both sync markers as they appear on the wire.
pub const SYNC_PATTERN: [u8; 8] = [0xDC, 0xC0, 0x23, 0xC2, 0xDC, 0xC0, 0x23, 0xC2];

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 14;

/// Largest payload a single frame may carry.
pub const MAX_PAYLOAD: usize = 4096;

/// Largest encoded frame.
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_PAYLOAD;

// Byte offsets of each field within the serialised header.
const OFF_SYNC1: usize = 0;
const OFF_SYNC2: usize = 4;
const OFF_CHECKSUM: usize = 8;
const OFF_LENGTH: usize = 10;
const OFF_ID: usize = 12;
const OFF_FLAGS: usize = 13;

/// Reasons a buffer cannot be turned into a [`Frame`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// One of the two sync markers does not equal [`SYNC`].
    #[error("invalid sync pattern")]
    InvalidSync,
    /// The stored checksum disagrees with the recomputed one.
    #[error("checksum mismatch (stored {stored:#06x}, computed {computed:#06x})")]
    ChecksumMismatch { stored: u16, computed: u16 },
    /// The length field declares more than [`MAX_PAYLOAD`] bytes.
    #[error("declared payload length {0} exceeds {max}", max = MAX_PAYLOAD)]
    InvalidLength(usize),
    /// An incomplete frame whose declared length runs over a later frame that
    /// is already complete and valid; the length field was corrupted.
    #[error("declared payload length {0} overruns a later valid frame")]
    LengthOverrun(usize),
    /// A frame was built with more than [`MAX_PAYLOAD`] bytes.
    #[error("payload of {0} bytes exceeds {max}", max = MAX_PAYLOAD)]
    PayloadTooLarge(usize),
}

/// A single protocol unit: sequence id, flag mask and payload.
///
/// The length and checksum header fields are derived on [`Frame::encode`] and
/// verified on [`Frame::decode`]; they are not stored here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Alternating-bit sequence id (0 or 1 for data and ACK frames).
    pub id: u8,
    /// Bitmask of [`flags`] constants.
    pub flags: u8,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(id: u8, flags: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            flags,
            payload: payload.into(),
        }
    }

    /// A plain data frame.
    pub fn data(id: u8, payload: impl Into<Bytes>) -> Self {
        Self::new(id, 0, payload)
    }

    /// A pure acknowledgement for the data frame with sequence id `id`.
    pub fn ack(id: u8) -> Self {
        Self::new(id, flags::ACK, Bytes::new())
    }

    /// A reset carrying an optional human-readable reason.
    pub fn rst(reason: &str) -> Self {
        let reason = &reason.as_bytes()[..reason.len().min(MAX_PAYLOAD)];
        Self::new(0, flags::RST, Bytes::copy_from_slice(reason))
    }

    pub fn is_ack(&self) -> bool {
        self.flags & flags::ACK != 0
    }

    pub fn is_end(&self) -> bool {
        self.flags & flags::END != 0
    }

    pub fn is_rst(&self) -> bool {
        self.flags & flags::RST != 0
    }

    /// Serialise this frame into a sealed byte buffer.
    ///
    /// The checksum is computed over the whole frame with its own field held
    /// at zero, then patched in place.
    pub fn encode(&self) -> Result<Bytes, FrameError> {
        let len = self.payload.len();
        if len > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge(len));
        }

        let mut buf = BytesMut::with_capacity(HEADER_LEN + len);
        buf.put_u32(SYNC);
        buf.put_u32(SYNC);
        buf.put_u16(0);
        buf.put_u16(len as u16);
        buf.put_u8(self.id);
        buf.put_u8(self.flags);
        buf.put_slice(&self.payload);

        let csum = internet_checksum(&buf);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&csum.to_be_bytes());

        Ok(buf.freeze())
    }

    /// Parse the frame at the front of `buf`.
    ///
    /// Returns:
    /// - `Ok(None)` if `buf` does not yet hold a complete frame,
    /// - `Ok(Some((frame, consumed)))` where `consumed` is the exact number of
    ///   bytes the frame occupied,
    /// - `Err(..)` if the bytes at the front are malformed.
    ///
    /// The sync markers are checked as soon as the header is present, so a
    /// misaligned buffer is rejected without waiting for a payload that a
    /// garbage length field might claim.
    pub fn decode(buf: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let sync1 = read_u32(buf, OFF_SYNC1);
        let sync2 = read_u32(buf, OFF_SYNC2);
        if sync1 != SYNC || sync2 != SYNC {
            return Err(FrameError::InvalidSync);
        }

        let len = usize::from(read_u16(buf, OFF_LENGTH));
        if len > MAX_PAYLOAD {
            return Err(FrameError::InvalidLength(len));
        }
        let total = HEADER_LEN + len;
        if buf.len() < total {
            return Ok(None);
        }

        let stored = read_u16(buf, OFF_CHECKSUM);
        let computed = sealed_checksum(&buf[..total]);
        if stored != computed {
            return Err(FrameError::ChecksumMismatch { stored, computed });
        }

        let frame = Frame {
            id: buf[OFF_ID],
            flags: buf[OFF_FLAGS],
            payload: Bytes::copy_from_slice(&buf[HEADER_LEN..total]),
        };
        Ok(Some((frame, total)))
    }
}

/// Payload length declared by a header at the front of `buf`.
///
/// `buf` must hold at least [`HEADER_LEN`] bytes.
pub fn declared_length(buf: &[u8]) -> usize {
    usize::from(read_u16(buf, OFF_LENGTH))
}

/// Recompute the checksum of an encoded frame with its checksum field zeroed.
pub fn sealed_checksum(encoded: &[u8]) -> u16 {
    let mut scratch = encoded.to_vec();
    scratch[OFF_CHECKSUM..OFF_CHECKSUM + 2].fill(0);
    internet_checksum(&scratch)
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([buf[off], buf[off + 1]])
}
