//! Async UDP channel.
//!
//! [`UdpChannel`] is the production [`Channel`]: a tokio UDP socket plus the
//! receive deadline the protocol adjusts after every RTT sample.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;

use super::error::{TransportError, TransportResult};
use crate::core::Channel;

/// UDP implementation of [`Channel`].
#[derive(Debug)]
pub struct UdpChannel {
    /// The underlying UDP socket.
    socket: UdpSocket,
    /// Peer remembered by [`Channel::connect`].
    peer: Option<SocketAddr>,
    /// Deadline applied to every receive.
    recv_timeout: Option<Duration>,
}

impl UdpChannel {
    /// Create a channel bound to the given address.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::from_socket(socket))
    }

    /// Bind an ephemeral local port suitable for talking to `remote`.
    pub async fn bind_for(remote: SocketAddr) -> io::Result<Self> {
        let ip = match remote {
            SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        Self::bind(SocketAddr::new(ip, 0)).await
    }

    /// Create a channel from an existing UDP socket.
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self {
            socket,
            peer: None,
            recv_timeout: None,
        }
    }

    /// Peer remembered by [`Channel::connect`], if any.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Get a reference to the underlying socket.
    pub fn inner(&self) -> &UdpSocket {
        &self.socket
    }
}

impl Channel for UdpChannel {
    async fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.socket.send(datagram).await.map(|_| ())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        match self.recv_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.socket.recv_from(buf))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "receive timed out"))?,
            None => self.socket.recv_from(buf).await,
        }
    }

    async fn connect(&mut self, peer: SocketAddr) -> io::Result<()> {
        self.socket.connect(peer).await?;
        self.peer = Some(peer);
        Ok(())
    }

    fn set_recv_timeout(&mut self, timeout: Option<Duration>) {
        self.recv_timeout = timeout;
    }

    fn recv_timeout(&self) -> Option<Duration> {
        self.recv_timeout
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

/// Resolve `host:port` to the first address the resolver returns.
pub async fn resolve(host: &str, port: u16) -> TransportResult<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| TransportError::UnresolvedHost(format!("{host}:{port}")))
}
