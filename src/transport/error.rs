//! Transport layer error types.
//!
//! Deadline expiry, stray segments and duplicates never show up here: the
//! protocol absorbs them. What remains is either caller misuse, a failed
//! handshake, or a channel the protocol cannot reason about.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use super::connection::ConnectionPhase;
use super::segment::{SegmentError, SegmentKind};

/// Transport layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A datagram that had to be a valid segment was not.
    #[error("segment error: {0}")]
    Segment(#[from] SegmentError),

    /// Channel failure (bind, resolve, or a non-deadline read/write error).
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Operation called in a phase that does not allow it.
    #[error("cannot {operation} while {phase}")]
    InvalidState {
        /// Rejected operation.
        operation: &'static str,
        /// Phase at the time of the call.
        phase: ConnectionPhase,
    },

    /// `listen` on a connection that already owns a channel.
    #[error("connection already bound to {0}")]
    AlreadyBound(SocketAddr),

    /// `send` payload does not fit into one segment.
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge {
        /// Requested payload size.
        len: usize,
        /// Maximum payload size.
        max: usize,
    },

    /// The first segment seen by a listener was not a connection request.
    #[error("expected {expected}, got {actual}")]
    UnexpectedSegment {
        /// Required segment type.
        expected: SegmentKind,
        /// Received segment type.
        actual: SegmentKind,
    },

    /// A bounded retry policy gave up on an unanswered segment.
    #[error("no reply after {attempts} attempts")]
    RetriesExhausted {
        /// Transmissions made.
        attempts: u32,
    },

    /// Name resolution produced no usable address.
    #[error("could not resolve host: {0}")]
    UnresolvedHost(String),
}

impl TransportError {
    /// Check if this error is a refused call that left the connection untouched.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            TransportError::InvalidState { .. }
                | TransportError::AlreadyBound(_)
                | TransportError::PayloadTooLarge { .. }
        )
    }

    /// Check if this error is fatal to the connection.
    pub fn is_fatal(&self) -> bool {
        !self.is_usage_error()
    }

    /// Check if this error aborted an accept attempt.
    pub fn is_handshake_error(&self) -> bool {
        matches!(
            self,
            TransportError::UnexpectedSegment { .. } | TransportError::Segment(_)
        )
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_errors() {
        let err = TransportError::InvalidState {
            operation: "send",
            phase: ConnectionPhase::Init,
        };
        assert!(err.is_usage_error());
        assert!(!err.is_fatal());
        assert!(!err.is_handshake_error());

        assert!(TransportError::AlreadyBound("127.0.0.1:1".parse().unwrap()).is_usage_error());
        assert!(TransportError::PayloadTooLarge { len: 2000, max: 1391 }.is_usage_error());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(TransportError::Io(io::Error::other("boom")).is_fatal());
        assert!(TransportError::RetriesExhausted { attempts: 3 }.is_fatal());
        assert!(TransportError::UnresolvedHost("nowhere".into()).is_fatal());
    }

    #[test]
    fn test_handshake_errors() {
        let err = TransportError::UnexpectedSegment {
            expected: SegmentKind::Syn,
            actual: SegmentKind::Data,
        };
        assert!(err.is_handshake_error());
        assert!(err.is_fatal());

        let err = TransportError::from(SegmentError::InvalidType(7));
        assert!(err.is_handshake_error());
    }

    #[test]
    fn test_display() {
        let err = TransportError::InvalidState {
            operation: "receive",
            phase: ConnectionPhase::Closed,
        };
        assert_eq!(err.to_string(), "cannot receive while CLOSED");

        let err = TransportError::UnexpectedSegment {
            expected: SegmentKind::Syn,
            actual: SegmentKind::Ack,
        };
        assert_eq!(err.to_string(), "expected SYN, got ACK");
    }
}
