//! Network simulator for deterministic testing.
//!
//! Real networks drop and duplicate datagrams. To exercise the
//! retransmission paths without depending on actual network conditions,
//! this module provides:
//!
//! - [`MemoryChannel`]: a pair of in-process endpoints that behave like two
//!   connected UDP sockets, receive deadlines included.
//! - [`Simulator`]: a wrapper around any [`Channel`] that applies a fault
//!   model to outbound datagrams.
//!
//! | Fault        | Description                                              |
//! |--------------|----------------------------------------------------------|
//! | Packet loss  | Drop a datagram with probability `loss_rate`.            |
//! | Duplication  | Deliver a datagram twice with probability `duplicate_rate`. |
//! | Fault rules  | Drop chosen occurrences of one segment type.             |
//!
//! Random faults come from a seeded RNG so a failing run can be replayed.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tracing::trace;

use crate::core::Channel;
use crate::transport::{Segment, SegmentKind};

/// One side of an in-process datagram link.
///
/// Sending to a peer that has been dropped succeeds, but the next receive
/// reports [`io::ErrorKind::ConnectionRefused`], as a connected UDP socket
/// does after an ICMP port-unreachable.
#[derive(Debug)]
pub struct MemoryChannel {
    local: SocketAddr,
    remote: SocketAddr,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    recv_timeout: Option<Duration>,
    refused: bool,
}

impl MemoryChannel {
    /// Create two endpoints wired to each other.
    pub fn pair() -> (Self, Self) {
        let a = SocketAddr::from((Ipv4Addr::new(10, 0, 0, 1), 5000));
        let b = SocketAddr::from((Ipv4Addr::new(10, 0, 0, 2), 5000));
        let (tx_ab, rx_ab) = mpsc::unbounded_channel();
        let (tx_ba, rx_ba) = mpsc::unbounded_channel();

        (
            Self::new(a, b, tx_ab, rx_ba),
            Self::new(b, a, tx_ba, rx_ab),
        )
    }

    fn new(
        local: SocketAddr,
        remote: SocketAddr,
        tx: mpsc::UnboundedSender<Vec<u8>>,
        rx: mpsc::UnboundedReceiver<Vec<u8>>,
    ) -> Self {
        Self {
            local,
            remote,
            tx,
            rx,
            recv_timeout: None,
            refused: false,
        }
    }

    /// Address of the other endpoint.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

impl Channel for MemoryChannel {
    async fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        if self.tx.send(datagram.to_vec()).is_err() {
            self.refused = true;
        }
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        if std::mem::take(&mut self.refused) {
            return Err(io::ErrorKind::ConnectionRefused.into());
        }

        let next = match self.recv_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.rx.recv())
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "receive timed out"))?,
            None => self.rx.recv().await,
        };

        match next {
            Some(datagram) => {
                let len = datagram.len().min(buf.len());
                buf[..len].copy_from_slice(&datagram[..len]);
                Ok((len, self.remote))
            }
            // Peer gone and nothing queued: nothing will ever arrive.
            None => match self.recv_timeout {
                Some(timeout) => {
                    tokio::time::sleep(timeout).await;
                    Err(io::Error::new(io::ErrorKind::TimedOut, "receive timed out"))
                }
                None => std::future::pending().await,
            },
        }
    }

    async fn connect(&mut self, _peer: SocketAddr) -> io::Result<()> {
        Ok(())
    }

    fn set_recv_timeout(&mut self, timeout: Option<Duration>) {
        self.recv_timeout = timeout;
    }

    fn recv_timeout(&self) -> Option<Duration> {
        self.recv_timeout
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }
}

/// Drops selected occurrences of one segment type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultRule {
    kind: SegmentKind,
    skip: u32,
    count: u32,
    seen: u32,
}

impl FaultRule {
    /// Drop the first `count` segments of type `kind`.
    pub fn drop_first(kind: SegmentKind, count: u32) -> Self {
        Self::drop_after(kind, 0, count)
    }

    /// Let `skip` segments of type `kind` through, then drop the next `count`.
    pub fn drop_after(kind: SegmentKind, skip: u32, count: u32) -> Self {
        Self {
            kind,
            skip,
            count,
            seen: 0,
        }
    }

    /// Count one outbound segment and report whether to drop it.
    pub fn should_drop(&mut self, kind: SegmentKind) -> bool {
        if kind != self.kind {
            return false;
        }
        self.seen = self.seen.saturating_add(1);
        self.seen > self.skip && self.seen - self.skip <= self.count
    }
}

/// Configuration for the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that any given datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a datagram is delivered twice.
    pub duplicate_rate: f64,
    /// RNG seed.
    pub seed: u64,
    /// Deterministic drops, applied before the random ones.
    pub rules: Vec<FaultRule>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default; the simulator is a transparent pass-through.
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            seed: 0,
            rules: Vec::new(),
        }
    }
}

impl SimulatorConfig {
    /// Random loss with the given probability and seed.
    pub fn lossy(loss_rate: f64, seed: u64) -> Self {
        Self {
            loss_rate,
            seed,
            ..Self::default()
        }
    }

    /// Add a deterministic drop rule.
    pub fn with_rule(mut self, rule: FaultRule) -> Self {
        self.rules.push(rule);
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    dropped: AtomicU64,
    duplicated: AtomicU64,
}

/// Shared datagram counters of a [`Simulator`].
///
/// Clones observe the same counters, so a test can keep a handle after the
/// simulator has moved into a connection.
#[derive(Debug, Clone, Default)]
pub struct SimulatorStats {
    inner: Arc<Counters>,
}

impl SimulatorStats {
    /// Datagrams handed to the simulator.
    pub fn sent(&self) -> u64 {
        self.inner.sent.load(Ordering::Relaxed)
    }

    /// Datagrams dropped.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Extra copies delivered.
    pub fn duplicated(&self) -> u64 {
        self.inner.duplicated.load(Ordering::Relaxed)
    }
}

/// A fault-injecting wrapper around a [`Channel`].
///
/// Faults apply to outbound datagrams only; wrap both ends to disturb both
/// directions.
#[derive(Debug)]
pub struct Simulator<C> {
    inner: C,
    loss_rate: f64,
    duplicate_rate: f64,
    rules: Vec<FaultRule>,
    rng: StdRng,
    stats: SimulatorStats,
}

impl<C: Channel> Simulator<C> {
    /// Wrap `inner` with the given fault model.
    pub fn new(inner: C, config: SimulatorConfig) -> Self {
        Self {
            inner,
            loss_rate: config.loss_rate.clamp(0.0, 1.0),
            duplicate_rate: config.duplicate_rate.clamp(0.0, 1.0),
            rules: config.rules,
            rng: StdRng::seed_from_u64(config.seed),
            stats: SimulatorStats::default(),
        }
    }

    /// Handle to the datagram counters.
    pub fn stats(&self) -> SimulatorStats {
        self.stats.clone()
    }

    /// The wrapped channel.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn should_drop(&mut self, datagram: &[u8]) -> bool {
        let mut dropped = false;
        if let Ok(segment) = Segment::decode(datagram) {
            for rule in &mut self.rules {
                dropped |= rule.should_drop(segment.kind);
            }
        }
        dropped || (self.loss_rate > 0.0 && self.rng.gen_bool(self.loss_rate))
    }
}

impl<C: Channel> Channel for Simulator<C> {
    async fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.stats.inner.sent.fetch_add(1, Ordering::Relaxed);

        if self.should_drop(datagram) {
            self.stats.inner.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(len = datagram.len(), "simulator: dropped datagram");
            return Ok(());
        }

        self.inner.send(datagram).await?;

        if self.duplicate_rate > 0.0 && self.rng.gen_bool(self.duplicate_rate) {
            self.stats.inner.duplicated.fetch_add(1, Ordering::Relaxed);
            trace!(len = datagram.len(), "simulator: duplicated datagram");
            self.inner.send(datagram).await?;
        }
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.recv(buf).await
    }

    async fn connect(&mut self, peer: SocketAddr) -> io::Result<()> {
        self.inner.connect(peer).await
    }

    fn set_recv_timeout(&mut self, timeout: Option<Duration>) {
        self.inner.set_recv_timeout(timeout);
    }

    fn recv_timeout(&self) -> Option<Duration> {
        self.inner.recv_timeout()
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::is_deadline_expiry;

    #[tokio::test]
    async fn test_memory_pair_delivers() {
        let (mut a, mut b) = MemoryChannel::pair();
        a.send(b"ping").await.unwrap();

        let mut buf = [0u8; 16];
        let (len, from) = b.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"ping");
        assert_eq!(from, a.local_addr().unwrap());
        assert_eq!(b.remote_addr(), a.local_addr().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_recv_timeout() {
        let (_a, mut b) = MemoryChannel::pair();
        b.set_recv_timeout(Some(Duration::from_millis(50)));

        let started = tokio::time::Instant::now();
        let mut buf = [0u8; 16];
        let err = b.recv(&mut buf).await.unwrap_err();
        assert!(is_deadline_expiry(&err));
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(started.elapsed() < Duration::from_millis(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_refused_after_peer_dropped() {
        let (mut a, b) = MemoryChannel::pair();
        drop(b);

        a.send(b"anyone?").await.unwrap();
        let mut buf = [0u8; 16];
        let err = a.recv(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);

        // Reported once; afterwards the link is just silent.
        a.set_recv_timeout(Some(Duration::from_millis(10)));
        let err = a.recv(&mut buf).await.unwrap_err();
        assert!(is_deadline_expiry(&err));
    }

    #[test]
    fn test_fault_rule_counts_per_kind() {
        let mut rule = FaultRule::drop_after(SegmentKind::Ack, 1, 2);
        assert!(!rule.should_drop(SegmentKind::Data));
        assert!(!rule.should_drop(SegmentKind::Ack));
        assert!(rule.should_drop(SegmentKind::Ack));
        assert!(!rule.should_drop(SegmentKind::Close));
        assert!(rule.should_drop(SegmentKind::Ack));
        assert!(!rule.should_drop(SegmentKind::Ack));

        let mut rule = FaultRule::drop_first(SegmentKind::Syn, 1);
        assert!(rule.should_drop(SegmentKind::Syn));
        assert!(!rule.should_drop(SegmentKind::Syn));
    }

    #[tokio::test]
    async fn test_simulator_rule_drops_segment() {
        let (a, mut b) = MemoryChannel::pair();
        let config =
            SimulatorConfig::default().with_rule(FaultRule::drop_first(SegmentKind::Syn, 1));
        let mut sim = Simulator::new(a, config);
        let stats = sim.stats();

        sim.send(&Segment::syn().encode()).await.unwrap();
        sim.send(&Segment::syn_ack().encode()).await.unwrap();

        let mut buf = [0u8; 16];
        let (len, _) = b.recv(&mut buf).await.unwrap();
        assert_eq!(Segment::decode(&buf[..len]).unwrap().kind, SegmentKind::SynAck);
        assert_eq!(stats.sent(), 2);
        assert_eq!(stats.dropped(), 1);
    }

    #[tokio::test]
    async fn test_simulator_full_loss_and_duplication() {
        let (a, mut b) = MemoryChannel::pair();
        let mut lossy = Simulator::new(a, SimulatorConfig::lossy(1.0, 7));
        for _ in 0..5 {
            lossy.send(b"gone").await.unwrap();
        }
        assert_eq!(lossy.stats().dropped(), 5);

        b.set_recv_timeout(Some(Duration::from_millis(5)));
        let mut buf = [0u8; 16];
        assert!(is_deadline_expiry(&b.recv(&mut buf).await.unwrap_err()));

        let (c, mut d) = MemoryChannel::pair();
        let config = SimulatorConfig {
            duplicate_rate: 1.0,
            ..SimulatorConfig::default()
        };
        let mut dup = Simulator::new(c, config);
        dup.send(b"twice").await.unwrap();
        assert_eq!(dup.stats().duplicated(), 1);
        for _ in 0..2 {
            let (len, _) = d.recv(&mut buf).await.unwrap();
            assert_eq!(&buf[..len], b"twice");
        }
    }

    #[test]
    fn test_seeded_loss_is_reproducible() {
        let (a, _) = MemoryChannel::pair();
        let (b, _) = MemoryChannel::pair();
        let mut first = Simulator::new(a, SimulatorConfig::lossy(0.5, 42));
        let mut second = Simulator::new(b, SimulatorConfig::lossy(0.5, 42));

        let datagram = Segment::ack(1).encode();
        let run_a: Vec<bool> = (0..32).map(|_| first.should_drop(&datagram)).collect();
        let run_b: Vec<bool> = (0..32).map(|_| second.should_drop(&datagram)).collect();
        assert_eq!(run_a, run_b);
        assert!(run_a.iter().any(|d| *d));
        assert!(run_a.iter().any(|d| !*d));
    }
}
