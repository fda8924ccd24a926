//! Connection state and the two exchange primitives every protocol step is
//! built from.
//!
//! A [`Connection`] moves through `INIT -> ESTABLISHED -> (FIN) -> CLOSED`.
//! The handshake, data transfer and teardown logic live in sibling modules;
//! this one owns the channel, the sequence counters and the RTT estimator.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, trace};

use super::config::ConnectionConfig;
use super::error::{TransportError, TransportResult};
use super::retry::Backoff;
use super::segment::{Segment, SegmentError};
use super::socket::{self, UdpChannel};
use super::timing::RttEstimator;
use crate::core::constants::MAX_SEG_SIZE;
use crate::core::{Channel, is_deadline_expiry};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionPhase {
    /// No handshake attempted yet.
    Init,
    /// Handshake complete, data may flow.
    Established,
    /// The peer's close request has been acknowledged; our own close is pending.
    Fin,
    /// Terminal; the channel has been released.
    Closed,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::Established => "ESTABLISHED",
            Self::Fin => "FIN",
            Self::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// How a wait-for-silence exchange reacts to a segment that arrives inside
/// its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Echo {
    /// Our segment was evidently lost: transmit it again and restart the window.
    Resend,
    /// Irrelevant; keep waiting out the rest of the window.
    Ignore,
    /// Stop waiting and hand the segment to the caller.
    Finish,
}

/// One datagram read from the channel.
#[derive(Debug)]
pub(super) struct Arrival {
    pub(super) from: SocketAddr,
    pub(super) segment: Result<Segment, SegmentError>,
}

/// A single reliable byte-stream connection over a datagram [`Channel`].
///
/// Every operation takes `&mut self`: there is at most one exchange in flight
/// and no background task.
///
/// # Example
///
/// ```ignore
/// use rdt_socket::Connection;
///
/// let mut conn = Connection::new();
/// conn.connect("127.0.0.1", 9000).await?;
/// conn.send(b"hello").await?;
/// conn.close().await?;
/// ```
#[derive(Debug)]
pub struct Connection<C: Channel = UdpChannel> {
    pub(super) channel: Option<C>,
    pub(super) phase: ConnectionPhase,
    pub(super) peer: Option<SocketAddr>,
    pub(super) next_send_seq: u32,
    pub(super) expected_recv_seq: u32,
    pub(super) rtt: RttEstimator,
    pub(super) config: ConnectionConfig,
    /// Segment received ahead of the `receive` call that will consume it.
    pub(super) pending: Option<Segment>,
    recv_buf: Vec<u8>,
}

impl Connection<UdpChannel> {
    /// Create a UDP connection with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ConnectionConfig::default())
    }

    /// Create a UDP connection with a custom configuration.
    ///
    /// No socket is created until [`connect`](Self::connect) or
    /// [`listen`](Self::listen).
    pub fn with_config(config: ConnectionConfig) -> Self {
        Self::build(None, config)
    }

    /// Active open towards `host:port`.
    ///
    /// Resolves the host, binds an ephemeral local port and runs the
    /// handshake. Resolution and bind failures are fatal.
    #[tracing::instrument(skip(self))]
    pub async fn connect(&mut self, host: &str, port: u16) -> TransportResult<()> {
        self.require(ConnectionPhase::Init, "connect")?;

        let remote = socket::resolve(host, port).await?;
        if self.channel.is_none() {
            self.channel = Some(UdpChannel::bind_for(remote).await?);
        }
        self.connect_to(remote).await
    }

    /// Bind the listening socket on `port` and return its address.
    ///
    /// Port 0 picks an ephemeral port.
    pub async fn listen(&mut self, port: u16) -> TransportResult<SocketAddr> {
        self.require(ConnectionPhase::Init, "listen")?;
        if let Some(channel) = &self.channel {
            return Err(TransportError::AlreadyBound(channel.local_addr()?));
        }

        let channel = UdpChannel::bind(SocketAddr::new(self.config.listen_ip, port)).await?;
        let local = channel.local_addr()?;
        debug!(%local, "listening");
        self.channel = Some(channel);
        Ok(local)
    }

    /// Passive open on `port`: [`listen`](Self::listen) then
    /// [`accept`](Connection::accept).
    pub async fn listen_and_accept(&mut self, port: u16) -> TransportResult<()> {
        self.listen(port).await?;
        self.accept().await
    }
}

impl Default for Connection<UdpChannel> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Channel> Connection<C> {
    /// Create a connection over an already-bound channel.
    pub fn from_channel(channel: C, config: ConnectionConfig) -> Self {
        Self::build(Some(channel), config)
    }

    fn build(channel: Option<C>, config: ConnectionConfig) -> Self {
        Self {
            channel,
            phase: ConnectionPhase::Init,
            peer: None,
            next_send_seq: 0,
            expected_recv_seq: 0,
            rtt: RttEstimator::new(config.initial_estimated_rtt, config.initial_dev_rtt),
            config,
            pending: None,
            recv_buf: vec![0u8; MAX_SEG_SIZE + 1],
        }
    }

    /// Passive open: wait for a `SYN` on the bound channel and complete the
    /// handshake with whoever sent it.
    #[tracing::instrument(skip_all)]
    pub async fn accept(&mut self) -> TransportResult<()> {
        self.require(ConnectionPhase::Init, "accept")?;
        self.channel_mut()?;
        self.passive_open().await
    }

    /// Active open towards `remote` over the bound channel.
    #[tracing::instrument(skip(self))]
    pub async fn connect_to(&mut self, remote: SocketAddr) -> TransportResult<()> {
        self.require(ConnectionPhase::Init, "connect")?;
        self.channel_mut()?;
        self.active_open(remote).await
    }

    /// Smoothed round-trip time.
    pub fn estimated_rtt(&self) -> Duration {
        self.rtt.estimated()
    }

    /// Smoothed round-trip time in whole milliseconds.
    pub fn estimated_rtt_ms(&self) -> u32 {
        self.rtt.estimated_ms()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Sequence number the next `send` will use.
    pub fn next_send_seq(&self) -> u32 {
        self.next_send_seq
    }

    /// Sequence number the next delivered segment must carry.
    pub fn expected_recv_seq(&self) -> u32 {
        self.expected_recv_seq
    }

    /// Remote endpoint, once known.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Local address of the channel.
    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        match &self.channel {
            Some(channel) => Ok(channel.local_addr()?),
            None => Err(not_bound()),
        }
    }

    /// The RTT estimator.
    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    /// Connection configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// The channel, until the connection is closed.
    pub fn channel(&self) -> Option<&C> {
        self.channel.as_ref()
    }

    // =========================================================================
    // Internals shared by the handshake, transfer and teardown modules
    // =========================================================================

    /// Refuse `operation` unless the connection is in `phase`.
    pub(super) fn require(
        &self,
        phase: ConnectionPhase,
        operation: &'static str,
    ) -> TransportResult<()> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(TransportError::InvalidState {
                operation,
                phase: self.phase,
            })
        }
    }

    pub(super) fn channel_mut(&mut self) -> TransportResult<&mut C> {
        self.channel.as_mut().ok_or_else(not_bound)
    }

    pub(super) fn set_recv_timeout(&mut self, timeout: Option<Duration>) -> TransportResult<()> {
        match timeout {
            Some(t) => trace!("setting timeout to {} ms", t.as_millis()),
            None => trace!("clearing timeout"),
        }
        self.channel_mut()?.set_recv_timeout(timeout);
        Ok(())
    }

    pub(super) fn establish(&mut self) {
        self.phase = ConnectionPhase::Established;
        info!(peer = ?self.peer, "connection established");
    }

    /// Drop the channel and enter `CLOSED`.
    pub(super) fn release(&mut self) {
        self.channel = None;
        self.pending = None;
        self.phase = ConnectionPhase::Closed;
        info!(peer = ?self.peer, "connection closed");
    }

    /// Send one segment, best effort.
    pub(super) async fn transmit(&mut self, segment: &Segment) -> TransportResult<()> {
        trace!(%segment, "send");
        let datagram = segment.encode();
        self.channel_mut()?.send(&datagram).await?;
        Ok(())
    }

    /// Wait for one datagram until the channel's deadline.
    ///
    /// Returns `None` when the deadline elapses.
    pub(super) async fn recv_once(&mut self) -> TransportResult<Option<Arrival>> {
        let channel = self.channel.as_mut().ok_or_else(not_bound)?;
        match channel.recv(&mut self.recv_buf).await {
            Ok((len, from)) => {
                let segment = Segment::decode(&self.recv_buf[..len]);
                match &segment {
                    Ok(s) => trace!(%from, segment = %s, "recv"),
                    Err(e) => debug!(%from, error = %e, "undecodable datagram"),
                }
                Ok(Some(Arrival { from, segment }))
            }
            Err(e) if is_deadline_expiry(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Reliable request/response: transmit `segment` until any reply arrives.
    ///
    /// Every expiry doubles the deadline in effect. The time since the last
    /// transmission is folded into the RTT estimate, and the new timeout is
    /// pushed into the channel. Returns `None` when the reply could not be
    /// decoded; judging the reply is up to the caller.
    pub(super) async fn exchange(&mut self, segment: &Segment) -> TransportResult<Option<Segment>> {
        let mut backoff = Backoff::new(self.rtt.timeout(), self.config.retry);
        self.set_recv_timeout(Some(backoff.timeout()))?;

        loop {
            self.transmit(segment).await?;
            let sent_at = Instant::now();
            backoff.on_transmit();

            match self.recv_once().await? {
                Some(arrival) => {
                    let timeout = self.rtt.update(sent_at.elapsed());
                    self.set_recv_timeout(Some(timeout))?;
                    return Ok(arrival.segment.ok());
                }
                None => {
                    let timeout = backoff.on_expiry()?;
                    debug!(
                        kind = %segment.kind,
                        attempts = backoff.attempts(),
                        "timed out; doubling timeout to {} ms",
                        timeout.as_millis()
                    );
                    self.set_recv_timeout(Some(timeout))?;
                }
            }
        }
    }

    /// Transmit `segment`, then wait one `window` for silence.
    ///
    /// `classify` decides what every segment arriving inside the window
    /// means. Returns `None` once a whole window passes without a
    /// [`Echo::Resend`] or [`Echo::Finish`], or the finishing segment.
    pub(super) async fn send_until_quiet<F>(
        &mut self,
        segment: &Segment,
        window: Duration,
        mut classify: F,
    ) -> TransportResult<Option<Segment>>
    where
        F: FnMut(&Segment) -> Echo,
    {
        let mut backoff = Backoff::new(window, self.config.retry);

        'send: loop {
            backoff.check_retry()?;
            self.transmit(segment).await?;
            backoff.on_transmit();
            let deadline = Instant::now() + window;

            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Ok(None);
                }
                self.set_recv_timeout(Some(remaining))?;

                let Some(arrival) = self.recv_once().await? else {
                    return Ok(None);
                };
                let Ok(reply) = arrival.segment else {
                    continue;
                };
                match classify(&reply) {
                    Echo::Resend => {
                        debug!(kind = %segment.kind, got = %reply.kind, "resending");
                        continue 'send;
                    }
                    Echo::Ignore => {}
                    Echo::Finish => return Ok(Some(reply)),
                }
            }
        }
    }
}

fn not_bound() -> TransportError {
    TransportError::Io(io::Error::new(
        io::ErrorKind::NotConnected,
        "connection has no channel",
    ))
}

/// Whether `err` reports that the peer's endpoint is gone.
pub(super) fn is_connection_refused(err: &TransportError) -> bool {
    matches!(err, TransportError::Io(e) if e.kind() == io::ErrorKind::ConnectionRefused)
}
