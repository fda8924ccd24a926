//! Connection establishment.
//!
//! ```text
//!   active                         passive
//!     | ---------- SYN ----------->  |   (first segment must be SYN)
//!     | <-------- SYNACK ----------  |   (resent until ACK or DATA)
//!     | ---------- ACK ----------->  |
//!     |   (wait for silence)         |
//! ```

use std::net::SocketAddr;

use tracing::debug;

use super::connection::{Connection, Echo};
use super::error::{TransportError, TransportResult};
use super::segment::{Segment, SegmentKind};
use crate::core::Channel;

/// Handshake progress of the passive opener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassiveOpen {
    /// Waiting for the first segment.
    Listening,
    /// `SYN` seen; `SYNACK` outstanding.
    SynReceived,
    /// Handshake complete.
    Established {
        /// The peer's first `DATA` segment stood in for the final `ACK`.
        early_data: bool,
    },
}

impl PassiveOpen {
    /// Apply one incoming segment type.
    ///
    /// Anything but `SYN` as the very first segment aborts the accept.
    pub fn on_segment(self, kind: SegmentKind) -> TransportResult<Self> {
        match (self, kind) {
            (Self::Listening, SegmentKind::Syn) => Ok(Self::SynReceived),
            (Self::Listening, actual) => Err(TransportError::UnexpectedSegment {
                expected: SegmentKind::Syn,
                actual,
            }),
            (Self::SynReceived, SegmentKind::Ack) => Ok(Self::Established { early_data: false }),
            (Self::SynReceived, SegmentKind::Data) => Ok(Self::Established { early_data: true }),
            (Self::SynReceived, _) => Ok(Self::SynReceived),
            (done @ Self::Established { .. }, _) => Ok(done),
        }
    }

    /// Whether the handshake is complete.
    pub fn is_established(self) -> bool {
        matches!(self, Self::Established { .. })
    }
}

/// Handshake progress of the active opener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveOpen {
    /// `SYN` outstanding.
    SynSent,
    /// Final `ACK` sent; waiting for silence.
    AckSent,
    /// Handshake complete.
    Established {
        /// The peer's first `DATA` segment arrived during the wait.
        early_data: bool,
    },
}

impl ActiveOpen {
    /// Apply the reply to `SYN`, or a segment seen while waiting for silence.
    ///
    /// `None` is an undecodable reply.
    pub fn on_segment(self, kind: Option<SegmentKind>) -> Self {
        match (self, kind) {
            (Self::SynSent, Some(SegmentKind::SynAck)) => Self::AckSent,
            (Self::SynSent, _) => Self::SynSent,
            (Self::AckSent, Some(SegmentKind::Data)) => Self::Established { early_data: true },
            (Self::AckSent, _) => Self::AckSent,
            (done @ Self::Established { .. }, _) => done,
        }
    }

    /// The wait after the final `ACK` ended without news from the peer.
    pub fn on_silence(self) -> Self {
        match self {
            Self::AckSent => Self::Established { early_data: false },
            other => other,
        }
    }

    /// How the final `ACK`'s silence window treats an arrival.
    ///
    /// A repeated `SYNACK` means our `ACK` was lost.
    pub fn echo(kind: SegmentKind) -> Echo {
        match kind {
            SegmentKind::SynAck => Echo::Resend,
            SegmentKind::Data => Echo::Finish,
            _ => Echo::Ignore,
        }
    }
}

impl<C: Channel> Connection<C> {
    pub(super) async fn passive_open(&mut self) -> TransportResult<()> {
        let mut state = PassiveOpen::Listening;

        self.set_recv_timeout(None)?;
        let arrival = loop {
            if let Some(arrival) = self.recv_once().await? {
                break arrival;
            }
        };
        let syn = arrival.segment?;
        state = state.on_segment(syn.kind)?;

        self.channel_mut()?.connect(arrival.from).await?;
        self.peer = Some(arrival.from);
        debug!(peer = %arrival.from, "received SYN");

        let syn_ack = Segment::syn_ack();
        while !state.is_established() {
            let Some(reply) = self.exchange(&syn_ack).await? else {
                continue;
            };
            state = state.on_segment(reply.kind)?;
            match state {
                PassiveOpen::Established { early_data: true } => {
                    debug!(seq = reply.sequence_number, "DATA acknowledged the handshake");
                    self.pending = Some(reply);
                }
                PassiveOpen::SynReceived => {
                    debug!(got = %reply.kind, "expected ACK; resending SYNACK");
                }
                _ => {}
            }
        }

        self.establish();
        Ok(())
    }

    pub(super) async fn active_open(&mut self, remote: SocketAddr) -> TransportResult<()> {
        self.channel_mut()?.connect(remote).await?;
        self.peer = Some(remote);

        let mut state = ActiveOpen::SynSent;
        let syn = Segment::syn();
        while state == ActiveOpen::SynSent {
            let reply = self.exchange(&syn).await?;
            state = state.on_segment(reply.as_ref().map(|s| s.kind));
            if state == ActiveOpen::SynSent {
                debug!(got = ?reply.map(|s| s.kind), "expected SYNACK; resending SYN");
            }
        }

        let window = self.rtt.timeout();
        let early = self
            .send_until_quiet(&Segment::ack(0), window, |s| ActiveOpen::echo(s.kind))
            .await?;
        state = match early {
            Some(data) => {
                let next = state.on_segment(Some(data.kind));
                self.pending = Some(data);
                next
            }
            None => state.on_silence(),
        };
        debug_assert!(matches!(state, ActiveOpen::Established { .. }));

        self.establish();
        Ok(())
    }
}
