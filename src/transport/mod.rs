//! Reliable transport over an unreliable datagram channel.
//!
//! This module provides:
//!
//! - **Segment encoding/decoding**: [`Segment`], [`SegmentKind`] and the 9-byte wire header
//! - **RTT estimation**: [`RttEstimator`] with the classic smoothed-RTT timeout
//! - **Retries**: [`RetryPolicy`] and per-exchange exponential [`Backoff`]
//! - **Connection**: [`Connection`] with handshake, stop-and-wait transfer and teardown
//! - **Async sockets**: [`UdpChannel`] wrapper for tokio UDP
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Application                  │
//! ├─────────────────────────────────────────┤
//! │  Connection                             │  ← This module
//! │  handshake │ transfer │ teardown        │
//! │  exchange / wait-for-silence, RTT       │
//! ├─────────────────────────────────────────┤
//! │  Channel (UDP, or the simulator)        │
//! └─────────────────────────────────────────┘
//! ```

mod config;
mod connection;
mod error;
mod handshake;
mod retry;
mod segment;
mod socket;
mod teardown;
mod timing;
mod transfer;

pub use config::{ConnectionConfig, ConnectionConfigBuilder};
pub use connection::{Connection, ConnectionPhase, Echo};
pub use error::{TransportError, TransportResult};
pub use handshake::{ActiveOpen, PassiveOpen};
pub use retry::{Backoff, RetryPolicy};
pub use segment::{Segment, SegmentError, SegmentKind};
pub use socket::{UdpChannel, resolve};
pub use teardown::{CloseInitiator, CloseResponder};
pub use timing::{RttEstimator, constants as timing_constants};
pub use transfer::{DataSend, Inbound};
