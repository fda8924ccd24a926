//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use rdt_socket::prelude::*;

/// Connection over a simulated, fault-injecting in-memory link.
pub type SimConnection = Connection<Simulator<MemoryChannel>>;

/// Install a test-friendly subscriber; `RUST_LOG` controls the output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off")),
        )
        .with_test_writer()
        .try_init();
}

/// Build a client/server pair over one in-memory link.
///
/// `client_faults` applies to datagrams the client sends, `server_faults`
/// to datagrams the server sends.
pub fn sim_pair(
    client_faults: SimulatorConfig,
    server_faults: SimulatorConfig,
    config: ConnectionConfig,
) -> (SimConnection, SimConnection, SimulatorStats, SimulatorStats) {
    sim_pair_with(client_faults, server_faults, config.clone(), config)
}

/// Like [`sim_pair`], with a separate configuration for each end.
pub fn sim_pair_with(
    client_faults: SimulatorConfig,
    server_faults: SimulatorConfig,
    client_config: ConnectionConfig,
    server_config: ConnectionConfig,
) -> (SimConnection, SimConnection, SimulatorStats, SimulatorStats) {
    let (a, b) = MemoryChannel::pair();
    let a = Simulator::new(a, client_faults);
    let b = Simulator::new(b, server_faults);
    let (client_stats, server_stats) = (a.stats(), b.stats());

    (
        Connection::from_channel(a, client_config),
        Connection::from_channel(b, server_config),
        client_stats,
        server_stats,
    )
}

/// Run the handshake on both ends concurrently.
pub async fn establish(client: &mut SimConnection, server: &mut SimConnection) {
    let server_addr = server.local_addr().expect("server address");
    let (c, s) = tokio::join!(client.connect_to(server_addr), server.accept());
    c.expect("client connect");
    s.expect("server accept");
    assert_eq!(client.phase(), ConnectionPhase::Established);
    assert_eq!(server.phase(), ConnectionPhase::Established);
}

/// Spawn a server task that receives until the peer closes, then closes.
pub fn spawn_sink(
    server: SimConnection,
) -> tokio::task::JoinHandle<(Vec<Vec<u8>>, SimConnection)> {
    tokio::spawn(drain_and_close(server))
}

/// Like [`spawn_sink`], but the task runs the passive open itself.
///
/// Under loss the server may still be waiting for the handshake `ACK` when
/// the client starts sending, so accept must keep running on its own task.
pub fn spawn_accepting_sink(
    mut server: SimConnection,
) -> tokio::task::JoinHandle<(Vec<Vec<u8>>, SimConnection)> {
    tokio::spawn(async move {
        server.accept().await.expect("server accept");
        drain_and_close(server).await
    })
}

async fn drain_and_close(mut server: SimConnection) -> (Vec<Vec<u8>>, SimConnection) {
    let mut received = Vec::new();
    while let Some(payload) = server.receive().await.expect("server receive") {
        received.push(payload);
    }
    assert_eq!(server.phase(), ConnectionPhase::Fin);
    server.close().await.expect("server close");
    (received, server)
}

/// A configuration with a short time-wait, for real-time tests.
pub fn quick_config() -> ConnectionConfig {
    ConnectionConfig::builder()
        .wait_time(Duration::from_millis(200))
        .listen_ip("127.0.0.1".parse().unwrap())
        .build()
}
