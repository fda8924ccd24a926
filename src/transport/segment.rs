//! Segment encoding and decoding.
//!
//! Every datagram exchanged between the two endpoints is exactly one
//! [`Segment`]. All multi-byte integers are big-endian (network order).
//!
//! ```text
//! +------------------+------------------+--------+---------------------+
//! | Sequence Number  | Ack Number       | Type   | Payload (DATA only) |
//! | 4 bytes (BE32)   | 4 bytes (BE32)   | 1 byte | 0..=1391 bytes      |
//! +------------------+------------------+--------+---------------------+
//! ```

use std::fmt;

use thiserror::Error;

use crate::core::constants::{
    HEADER_SIZE, MAX_DATA_SIZE, MAX_SEG_SIZE, TYPE_ACK, TYPE_CLOSE, TYPE_DATA, TYPE_SYN,
    TYPE_SYNACK,
};

// Byte offsets of each header field.
const OFF_SEQ: usize = 0;
const OFF_ACK: usize = 4;
const OFF_TYPE: usize = 8;

/// Segment type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SegmentKind {
    /// Connection request from the active opener.
    Syn = TYPE_SYN,
    /// Passive opener's answer to a `SYN`.
    SynAck = TYPE_SYNACK,
    /// Acknowledgment of a handshake, data or close segment.
    Ack = TYPE_ACK,
    /// Application payload.
    Data = TYPE_DATA,
    /// Close request.
    Close = TYPE_CLOSE,
}

impl SegmentKind {
    /// Parse a type tag.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            TYPE_SYN => Some(Self::Syn),
            TYPE_SYNACK => Some(Self::SynAck),
            TYPE_ACK => Some(Self::Ack),
            TYPE_DATA => Some(Self::Data),
            TYPE_CLOSE => Some(Self::Close),
            _ => None,
        }
    }

    /// Wire representation of the tag.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Syn => "SYN",
            Self::SynAck => "SYNACK",
            Self::Ack => "ACK",
            Self::Data => "DATA",
            Self::Close => "CLOSE",
        };
        f.write_str(name)
    }
}

/// One protocol segment.
///
/// Control segments (`SYN`, `SYNACK`, `CLOSE`) carry the correlation value 0
/// in both numeric fields. An `ACK` echoes the number it acknowledges in both
/// fields. Only `DATA` segments carry a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Stream position of a `DATA` segment, or the echoed number of an `ACK`.
    pub sequence_number: u32,
    /// Number being acknowledged.
    pub ack_number: u32,
    /// Segment type.
    pub kind: SegmentKind,
    /// Application bytes; empty for control segments.
    pub payload: Vec<u8>,
}

impl Segment {
    /// A payload-free control segment with correlation value 0.
    pub fn control(kind: SegmentKind) -> Self {
        Self {
            sequence_number: 0,
            ack_number: 0,
            kind,
            payload: Vec::new(),
        }
    }

    /// Connection request.
    pub fn syn() -> Self {
        Self::control(SegmentKind::Syn)
    }

    /// Connection request acknowledgment.
    pub fn syn_ack() -> Self {
        Self::control(SegmentKind::SynAck)
    }

    /// Close request.
    pub fn close() -> Self {
        Self::control(SegmentKind::Close)
    }

    /// Acknowledgment of `number`.
    pub fn ack(number: u32) -> Self {
        Self {
            sequence_number: number,
            ack_number: number,
            kind: SegmentKind::Ack,
            payload: Vec::new(),
        }
    }

    /// Data segment at stream position `sequence_number`.
    pub fn data(sequence_number: u32, payload: &[u8]) -> Result<Self, SegmentError> {
        if payload.len() > MAX_DATA_SIZE {
            return Err(SegmentError::PayloadTooLarge {
                max: MAX_DATA_SIZE,
                actual: payload.len(),
            });
        }
        Ok(Self {
            sequence_number,
            ack_number: 0,
            kind: SegmentKind::Data,
            payload: payload.to_vec(),
        })
    }

    /// Encoded length on the wire.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Serialize into a newly allocated datagram.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.encoded_len()];
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.sequence_number.to_be_bytes());
        buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&self.ack_number.to_be_bytes());
        buf[OFF_TYPE] = self.kind.as_byte();
        buf[HEADER_SIZE..].copy_from_slice(&self.payload);
        buf
    }

    /// Parse a received datagram.
    pub fn decode(bytes: &[u8]) -> Result<Self, SegmentError> {
        if bytes.len() < HEADER_SIZE {
            return Err(SegmentError::TooShort {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        if bytes.len() > MAX_SEG_SIZE {
            return Err(SegmentError::TooLong {
                max: MAX_SEG_SIZE,
                actual: bytes.len(),
            });
        }

        let sequence_number = read_u32(bytes, OFF_SEQ);
        let ack_number = read_u32(bytes, OFF_ACK);
        let kind = SegmentKind::from_byte(bytes[OFF_TYPE])
            .ok_or(SegmentError::InvalidType(bytes[OFF_TYPE]))?;

        let payload = &bytes[HEADER_SIZE..];
        if kind != SegmentKind::Data && !payload.is_empty() {
            return Err(SegmentError::UnexpectedPayload {
                kind,
                len: payload.len(),
            });
        }

        Ok(Self {
            sequence_number,
            ack_number,
            kind,
            payload: payload.to_vec(),
        })
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (seq: {}, ack: {}, payload: <{} bytes>)",
            self.kind,
            self.sequence_number,
            self.ack_number,
            self.payload.len()
        )
    }
}

/// Errors that can occur while building or parsing a segment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SegmentError {
    /// Datagram shorter than the fixed header.
    #[error("segment too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Header size.
        expected: usize,
        /// Bytes received.
        actual: usize,
    },

    /// Datagram longer than a segment may be.
    #[error("segment too long: at most {max} bytes allowed, got {actual}")]
    TooLong {
        /// Maximum segment size.
        max: usize,
        /// Bytes received.
        actual: usize,
    },

    /// Type tag outside the five known values.
    #[error("invalid segment type: 0x{0:02x}")]
    InvalidType(u8),

    /// Control segment followed by payload bytes.
    #[error("{kind} segment carries {len} unexpected payload bytes")]
    UnexpectedPayload {
        /// Decoded type.
        kind: SegmentKind,
        /// Trailing bytes after the header.
        len: usize,
    },

    /// Payload does not fit into one segment.
    #[error("payload too large: at most {max} bytes allowed, got {actual}")]
    PayloadTooLarge {
        /// Maximum payload size.
        max: usize,
        /// Requested payload size.
        actual: usize,
    },
}
