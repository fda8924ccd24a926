//! Stop-and-wait data transfer.
//!
//! The sender keeps retransmitting one `DATA` segment until the matching
//! `ACK` comes back. The receiver acknowledges every `DATA` segment it sees
//! but only delivers the one carrying the expected sequence number.

use tracing::{debug, trace};

use super::connection::{Connection, ConnectionPhase, Echo};
use super::error::{TransportError, TransportResult};
use super::segment::{Segment, SegmentError, SegmentKind};
use crate::core::Channel;

/// Progress of one `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSend {
    /// Waiting for `ACK(seq)`.
    AwaitingAck(u32),
    /// `ACK(seq)` received.
    Acknowledged(u32),
}

impl DataSend {
    /// Apply the reply to the outstanding `DATA` segment.
    ///
    /// Only an `ACK` for exactly this sequence number completes the send.
    pub fn on_reply(self, reply: Option<&Segment>) -> Self {
        match (self, reply) {
            (Self::AwaitingAck(seq), Some(s))
                if s.kind == SegmentKind::Ack && s.ack_number == seq =>
            {
                Self::Acknowledged(seq)
            }
            (state, _) => state,
        }
    }
}

/// What the receive path does with one incoming segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// Expected `DATA`: acknowledge, deliver, advance.
    Deliver,
    /// `DATA` out of sequence: acknowledge and discard.
    Duplicate,
    /// Late `SYNACK`: the peer missed our handshake `ACK`.
    HandshakeRetransmit,
    /// The peer wants to close.
    Close,
    /// Stray `ACK` or `SYN`.
    Ignore,
}

impl Inbound {
    /// Classify `segment` for a receiver expecting `expected`.
    pub fn classify(segment: &Segment, expected: u32) -> Self {
        match segment.kind {
            SegmentKind::Data if segment.sequence_number == expected => Self::Deliver,
            SegmentKind::Data => Self::Duplicate,
            SegmentKind::SynAck => Self::HandshakeRetransmit,
            SegmentKind::Close => Self::Close,
            SegmentKind::Ack | SegmentKind::Syn => Self::Ignore,
        }
    }

    /// How the responder's close acknowledgment window treats an arrival.
    pub fn close_ack_echo(kind: SegmentKind) -> Echo {
        match kind {
            SegmentKind::Close => Echo::Resend,
            _ => Echo::Ignore,
        }
    }
}

impl<C: Channel> Connection<C> {
    /// Send one payload of at most `MAX_DATA_SIZE` bytes and wait for its
    /// acknowledgment.
    #[tracing::instrument(skip_all, fields(seq = self.next_send_seq, len = payload.len()))]
    pub async fn send(&mut self, payload: &[u8]) -> TransportResult<()> {
        self.require(ConnectionPhase::Established, "send")?;

        let seq = self.next_send_seq;
        let segment = match Segment::data(seq, payload) {
            Ok(segment) => segment,
            Err(SegmentError::PayloadTooLarge { max, actual }) => {
                return Err(TransportError::PayloadTooLarge { len: actual, max });
            }
            Err(e) => return Err(e.into()),
        };
        let mut state = DataSend::AwaitingAck(seq);

        loop {
            let reply = self.exchange(&segment).await?;
            state = state.on_reply(reply.as_ref());
            if let DataSend::Acknowledged(_) = state {
                break;
            }
            match reply {
                Some(data) if data.kind == SegmentKind::Data => self.absorb_data(data).await?,
                Some(other) => debug!(got = %other, "discarding reply"),
                None => {}
            }
        }

        self.next_send_seq = seq.wrapping_add(1);
        trace!(next = self.next_send_seq, "acknowledged");
        Ok(())
    }

    /// Receive the next in-order payload.
    ///
    /// Returns `None` once the peer's close request has been acknowledged;
    /// the connection is then in `FIN` and [`close`](Self::close) completes
    /// the teardown.
    #[tracing::instrument(skip_all, fields(expected = self.expected_recv_seq))]
    pub async fn receive(&mut self) -> TransportResult<Option<Vec<u8>>> {
        self.require(ConnectionPhase::Established, "receive")?;

        loop {
            let segment = match self.pending.take() {
                Some(segment) => segment,
                None => {
                    self.set_recv_timeout(None)?;
                    let Some(arrival) = self.recv_once().await? else {
                        continue;
                    };
                    match arrival.segment {
                        Ok(segment) => segment,
                        Err(_) => continue,
                    }
                }
            };

            match Inbound::classify(&segment, self.expected_recv_seq) {
                Inbound::Deliver => {
                    self.transmit(&Segment::ack(segment.sequence_number)).await?;
                    self.expected_recv_seq = self.expected_recv_seq.wrapping_add(1);
                    return Ok(Some(segment.payload));
                }
                Inbound::Duplicate => {
                    debug!(
                        seq = segment.sequence_number,
                        expected = self.expected_recv_seq,
                        "duplicate DATA; re-acknowledging"
                    );
                    self.transmit(&Segment::ack(segment.sequence_number)).await?;
                }
                Inbound::HandshakeRetransmit => {
                    debug!("late SYNACK; re-acknowledging handshake");
                    self.transmit(&Segment::ack(0)).await?;
                }
                Inbound::Close => {
                    debug!("received CLOSE");
                    let window = self.rtt.timeout();
                    self.send_until_quiet(&Segment::ack(0), window, |s| {
                        Inbound::close_ack_echo(s.kind)
                    })
                    .await?;
                    self.phase = ConnectionPhase::Fin;
                    return Ok(None);
                }
                Inbound::Ignore => trace!(kind = %segment.kind, "ignoring"),
            }
        }
    }

    /// A `DATA` segment arrived while we were waiting on our own exchange.
    ///
    /// It is acknowledged right away; the expected one is kept for the next
    /// [`receive`](Self::receive).
    pub(super) async fn absorb_data(&mut self, data: Segment) -> TransportResult<()> {
        self.transmit(&Segment::ack(data.sequence_number)).await?;
        if data.sequence_number == self.expected_recv_seq && self.pending.is_none() {
            debug!(seq = data.sequence_number, "keeping DATA for the next receive");
            self.pending = Some(data);
        }
        Ok(())
    }
}
