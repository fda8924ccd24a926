//! Core traits for the reliable transport.
//!
//! The protocol engine never touches a socket directly. Everything it needs
//! from the network is expressed by [`Channel`], so the same connection code
//! runs over real UDP and over the in-memory simulator.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

/// An unreliable, unordered, unicast datagram channel.
///
/// Datagrams may be lost but are delivered whole. A channel serves exactly one
/// connection for its whole lifetime and is released by dropping it.
///
/// # Receive deadline
///
/// The channel owns a receive timeout, set with [`Channel::set_recv_timeout`].
/// When it elapses before a datagram arrives, [`Channel::recv`] fails with
/// [`io::ErrorKind::TimedOut`] (or [`io::ErrorKind::WouldBlock`]); callers use
/// [`is_deadline_expiry`] to tell that apart from a real channel failure.
/// `None` means wait indefinitely.
pub trait Channel: Send {
    /// Send one datagram to the remembered peer.
    fn send(&mut self, datagram: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Receive one datagram into `buf`, returning its length and source.
    ///
    /// Datagrams longer than `buf` are truncated.
    fn recv(
        &mut self,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send;

    /// Remember `peer` as the destination of every later [`Channel::send`].
    fn connect(&mut self, peer: SocketAddr) -> impl Future<Output = io::Result<()>> + Send;

    /// Set the receive deadline applied to every later [`Channel::recv`].
    fn set_recv_timeout(&mut self, timeout: Option<Duration>);

    /// The receive deadline currently in effect.
    fn recv_timeout(&self) -> Option<Duration>;

    /// Local address of the channel.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Whether `err` reports an elapsed receive deadline rather than a failure.
pub fn is_deadline_expiry(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}
