//! # RDT Socket
//!
//! **R**eliable **D**ata **T**ransport over UDP.
//!
//! A connection-oriented, reliable byte-stream protocol running on top of an
//! unreliable datagram channel: the single-connection analogue of a minimal
//! TCP. It provides:
//!
//! - **Handshake**: three-way `SYN` / `SYNACK` / `ACK` open
//! - **Reliability**: stop-and-wait delivery, one unacknowledged segment in flight
//! - **Adaptive timeouts**: smoothed RTT estimate with exponential backoff
//! - **Teardown**: loss-tolerant close with a bounded time-wait
//!
//! ## Feature Flags
//!
//! - `transport` (default): Segments, RTT, UDP channel and [`Connection`]
//! - `simulator` (default): In-memory and lossy channels for testing
//!
//! ## Modules
//!
//! - [`core`]: Protocol constants and the [`Channel`] trait (always included)
//! - [`transport`]: Transport layer (requires `transport` feature)
//! - [`simulator`]: Fault injection (requires `simulator` feature)
//!
//! ## Example Usage
//!
//! ```no_run
//! use rdt_socket::prelude::*;
//!
//! # async fn run() -> TransportResult<()> {
//! // Passive side
//! let mut server = Connection::new();
//! server.listen_and_accept(9000).await?;
//! while let Some(payload) = server.receive().await? {
//!     println!("got {} bytes", payload.len());
//! }
//! server.close().await?;
//! # Ok(())
//! # }
//!
//! # async fn client() -> TransportResult<()> {
//! // Active side
//! let mut client = Connection::new();
//! client.connect("127.0.0.1", 9000).await?;
//! client.send(b"hello").await?;
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Transport layer (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

// Fault-injection simulator (feature-gated)
#[cfg(feature = "simulator")]
#[cfg_attr(docsrs, doc(cfg(feature = "simulator")))]
pub mod simulator;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and constants
    pub use crate::core::constants::*;
    pub use crate::core::{Channel, is_deadline_expiry};

    // Transport types (when enabled)
    #[cfg(feature = "transport")]
    pub use crate::transport::{
        Connection, ConnectionConfig, ConnectionConfigBuilder, ConnectionPhase, RetryPolicy,
        RttEstimator, Segment, SegmentKind, TransportError, TransportResult, UdpChannel,
    };

    // Simulator types (when enabled)
    #[cfg(feature = "simulator")]
    pub use crate::simulator::{
        FaultRule, MemoryChannel, Simulator, SimulatorConfig, SimulatorStats,
    };
}

// Re-export commonly used items at crate root
pub use crate::core::Channel;

#[cfg(feature = "transport")]
pub use transport::{
    Connection, ConnectionConfig, ConnectionPhase, RetryPolicy, Segment, SegmentKind,
    TransportError, TransportResult, UdpChannel,
};
