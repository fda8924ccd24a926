//! Connection teardown.
//!
//! ```text
//!   initiator                      responder
//!     | --------- CLOSE ---------->  |   receive() returns None, phase FIN
//!     | <--------- ACK ------------  |
//!     |                              |   close()
//!     | <-------- CLOSE -----------  |
//!     | ---------- ACK ----------->  |   CLOSED
//!     |   (time-wait)                |
//!   CLOSED
//! ```

use tracing::debug;

use super::connection::{Connection, ConnectionPhase, Echo, is_connection_refused};
use super::error::{TransportError, TransportResult};
use super::segment::{Segment, SegmentKind};
use crate::core::Channel;

/// Teardown progress of the endpoint that closed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseInitiator {
    /// `CLOSE` outstanding.
    CloseSent,
    /// Our `CLOSE` was acknowledged; waiting for the peer's.
    AwaitingPeerClose,
    /// Final `ACK` sent; absorbing retransmitted `CLOSE`s.
    TimeWait,
}

impl CloseInitiator {
    /// Apply one incoming segment (`None` for an undecodable reply).
    ///
    /// A `CLOSE` answering our own `CLOSE` is the peer's close request, so it
    /// also counts as the acknowledgment.
    pub fn on_segment(self, segment: Option<&Segment>) -> Self {
        let Some(segment) = segment else {
            return self;
        };
        match (self, segment.kind) {
            (Self::CloseSent, SegmentKind::Ack) if is_close_ack(segment) => {
                Self::AwaitingPeerClose
            }
            (Self::CloseSent | Self::AwaitingPeerClose, SegmentKind::Close) => Self::TimeWait,
            (state, _) => state,
        }
    }

    /// How the time-wait window treats an arrival.
    pub fn echo(kind: SegmentKind) -> Echo {
        match kind {
            SegmentKind::Close => Echo::Resend,
            _ => Echo::Ignore,
        }
    }
}

/// Teardown progress of the endpoint that saw the peer's `CLOSE` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseResponder {
    /// `CLOSE` outstanding.
    CloseSent,
    /// Acknowledged, or the peer is already gone.
    Closed,
}

impl CloseResponder {
    /// Apply the reply to our `CLOSE`.
    pub fn on_segment(self, segment: Option<&Segment>) -> Self {
        match (self, segment) {
            (Self::CloseSent, Some(s)) if s.kind == SegmentKind::Ack && is_close_ack(s) => {
                Self::Closed
            }
            (state, _) => state,
        }
    }

    /// The peer's endpoint refused our `CLOSE`.
    ///
    /// The initiator only releases its channel after time-wait, which it
    /// enters once our `CLOSE` got through.
    pub fn on_refused(self) -> Self {
        Self::Closed
    }
}

/// Close requests are acknowledged with `ACK(0)`; a stale data
/// acknowledgment for any later sequence number must not end the exchange.
fn is_close_ack(segment: &Segment) -> bool {
    segment.ack_number == 0
}

impl<C: Channel> Connection<C> {
    /// Tear the connection down.
    ///
    /// From `ESTABLISHED` this endpoint initiates the close; from `FIN` it
    /// answers the close the peer started. In `INIT` the channel is simply
    /// released. Either way the connection ends up `CLOSED`.
    #[tracing::instrument(skip_all, fields(phase = %self.phase))]
    pub async fn close(&mut self) -> TransportResult<()> {
        match self.phase {
            ConnectionPhase::Init => {
                self.release();
                Ok(())
            }
            ConnectionPhase::Established => self.close_as_initiator().await,
            ConnectionPhase::Fin => self.close_as_responder().await,
            ConnectionPhase::Closed => Err(TransportError::InvalidState {
                operation: "close",
                phase: self.phase,
            }),
        }
    }

    async fn close_as_initiator(&mut self) -> TransportResult<()> {
        let mut state = CloseInitiator::CloseSent;
        let close = Segment::close();

        while state == CloseInitiator::CloseSent {
            let reply = self.exchange(&close).await?;
            state = state.on_segment(reply.as_ref());
            if let Some(reply) = reply {
                self.answer_while_closing(reply).await?;
            }
        }

        if state == CloseInitiator::AwaitingPeerClose {
            debug!("CLOSE acknowledged; waiting for peer CLOSE");
            self.set_recv_timeout(None)?;
        }
        while state == CloseInitiator::AwaitingPeerClose {
            let Some(arrival) = self.recv_once().await? else {
                continue;
            };
            let Ok(segment) = arrival.segment else {
                continue;
            };
            state = state.on_segment(Some(&segment));
            self.answer_while_closing(segment).await?;
        }

        debug!(wait_ms = self.config.wait_time.as_millis(), "entering time-wait");
        let wait = self.config.wait_time;
        let waited = self
            .send_until_quiet(&Segment::ack(0), wait, |s| CloseInitiator::echo(s.kind))
            .await;

        // Our CLOSE went through; the channel goes either way.
        self.release();
        match waited {
            Ok(_) => Ok(()),
            Err(e) if is_connection_refused(&e) => {
                debug!("peer already released");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn close_as_responder(&mut self) -> TransportResult<()> {
        let mut state = CloseResponder::CloseSent;
        let close = Segment::close();

        while state == CloseResponder::CloseSent {
            state = match self.exchange(&close).await {
                Ok(reply) => state.on_segment(reply.as_ref()),
                Err(e) if is_connection_refused(&e) => {
                    debug!("peer already released");
                    state.on_refused()
                }
                Err(e) => return Err(e),
            };
        }

        self.release();
        Ok(())
    }

    /// Keep a peer that has not seen our `CLOSE` yet from stalling.
    ///
    /// Its `DATA` is acknowledged and dropped; a late `SYNACK` gets the
    /// handshake `ACK` it is waiting for.
    async fn answer_while_closing(&mut self, segment: Segment) -> TransportResult<()> {
        match segment.kind {
            SegmentKind::Data => {
                debug!(seq = segment.sequence_number, "dropping DATA received while closing");
                self.transmit(&Segment::ack(segment.sequence_number)).await
            }
            SegmentKind::SynAck => self.transmit(&Segment::ack(0)).await,
            _ => Ok(()),
        }
    }
}
