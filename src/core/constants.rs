//! Protocol constants.
//!
//! These values are shared by both endpoints and MUST NOT be changed
//! independently on one side.

use std::time::Duration;

// =============================================================================
// SEGMENT SIZES
// =============================================================================

/// Maximum size of one encoded segment (header + payload) on the wire.
pub const MAX_SEG_SIZE: usize = 1400;

/// Size of the fixed segment header: sequence number, ack number, type tag.
pub const HEADER_SIZE: usize = 4 + 4 + 1;

/// Largest payload a single `DATA` segment can carry.
pub const MAX_DATA_SIZE: usize = MAX_SEG_SIZE - HEADER_SIZE;

// =============================================================================
// SEGMENT TYPE TAGS
// =============================================================================

/// Connection request (active open).
pub const TYPE_SYN: u8 = 0;

/// Connection request acknowledgment (passive open).
pub const TYPE_SYNACK: u8 = 1;

/// Acknowledgment.
pub const TYPE_ACK: u8 = 2;

/// Application data.
pub const TYPE_DATA: u8 = 3;

/// Close request.
pub const TYPE_CLOSE: u8 = 4;

// =============================================================================
// TIMING
// =============================================================================

/// How long the close initiator lingers after its final `ACK`.
pub const WAIT_TIME: Duration = Duration::from_millis(4000);

/// Smoothed RTT before the first sample.
pub const INITIAL_ESTIMATED_RTT: Duration = Duration::from_millis(100);

/// RTT deviation before the first sample.
pub const INITIAL_DEV_RTT: Duration = Duration::from_millis(10);
