//! End-to-end tests over real UDP sockets on the loopback interface.
//!
//! The server side runs in its own task so both endpoints make progress
//! concurrently.

mod common;

use std::time::Duration;

use rdt_socket::prelude::*;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use common::{init_tracing, quick_config};

const DEADLINE: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Test 1: connect, send "hello", close
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_hello_over_loopback() {
    init_tracing();

    let mut server = Connection::with_config(quick_config());
    let port = server.listen(0).await.expect("listen").port();

    let server = tokio::spawn(async move {
        server.accept().await.expect("accept");

        let payload = server.receive().await.expect("receive");
        assert_eq!(payload.as_deref(), Some(&b"hello"[..]));
        assert_eq!(payload.map(|p| p.len()), Some(5));

        assert_eq!(server.receive().await.expect("receive close"), None);
        assert_eq!(server.phase(), ConnectionPhase::Fin);

        server.close().await.expect("server close");
        server
    });

    let mut client = Connection::with_config(quick_config());
    timeout(DEADLINE, async {
        client.connect("127.0.0.1", port).await.expect("connect");
        client.send(b"hello").await.expect("send");
        client.close().await.expect("client close");
    })
    .await
    .expect("client timed out");

    let server = timeout(DEADLINE, server)
        .await
        .expect("server timed out")
        .unwrap();

    assert_eq!(client.phase(), ConnectionPhase::Closed);
    assert_eq!(server.phase(), ConnectionPhase::Closed);
    assert_eq!(client.next_send_seq(), 1);
    assert_eq!(server.expected_recv_seq(), 1);
    assert!(client.channel().is_none());
    assert!(server.channel().is_none());
    assert!(client.rtt().samples() > 0);
}

// ---------------------------------------------------------------------------
// Test 2: request/response in both directions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_ping_pong() {
    init_tracing();

    let mut server = Connection::with_config(quick_config());
    let port = server.listen(0).await.unwrap().port();

    let server = tokio::spawn(async move {
        server.accept().await.unwrap();
        while let Some(request) = server.receive().await.unwrap() {
            let mut reply = b"re: ".to_vec();
            reply.extend_from_slice(&request);
            server.send(&reply).await.unwrap();
        }
        server.close().await.unwrap();
        server
    });

    let mut client = Connection::with_config(quick_config());
    timeout(DEADLINE, async {
        client.connect("127.0.0.1", port).await.unwrap();
        for i in 0..5u32 {
            let request = format!("ping {i}");
            client.send(request.as_bytes()).await.unwrap();
            let reply = client.receive().await.unwrap().expect("reply");
            assert_eq!(reply, format!("re: ping {i}").into_bytes());
        }
        client.close().await.unwrap();
    })
    .await
    .expect("client timed out");

    let server = timeout(DEADLINE, server).await.unwrap().unwrap();
    assert_eq!(client.next_send_seq(), 5);
    assert_eq!(client.expected_recv_seq(), 5);
    assert_eq!(server.next_send_seq(), 5);
    assert_eq!(server.expected_recv_seq(), 5);
}

// ---------------------------------------------------------------------------
// Test 3: payload limits
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_largest_payload_and_oversize_rejection() {
    init_tracing();

    let mut server = Connection::with_config(quick_config());
    let port = server.listen(0).await.unwrap().port();

    let server = tokio::spawn(async move {
        assert!(matches!(
            server.listen_and_accept(0).await,
            Err(TransportError::AlreadyBound(_))
        ));
        server.accept().await.unwrap();
        let big = server.receive().await.unwrap().unwrap();
        assert_eq!(big.len(), MAX_DATA_SIZE);
        assert!(big.iter().all(|b| *b == 0x5A));

        let empty = server.receive().await.unwrap().unwrap();
        assert!(empty.is_empty());

        assert_eq!(server.receive().await.unwrap(), None);
        server.close().await.unwrap();
    });

    let mut client = Connection::with_config(quick_config());
    timeout(DEADLINE, async {
        client.connect("127.0.0.1", port).await.unwrap();

        client.send(&[0x5A; MAX_DATA_SIZE]).await.unwrap();

        let err = client.send(&[0u8; MAX_DATA_SIZE + 1]).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::PayloadTooLarge { len, max } if len == MAX_DATA_SIZE + 1 && max == MAX_DATA_SIZE
        ));
        assert!(err.is_usage_error());
        assert_eq!(client.next_send_seq(), 1);

        client.send(&[]).await.unwrap();
        assert_eq!(client.next_send_seq(), 2);
        client.close().await.unwrap();
    })
    .await
    .expect("client timed out");

    timeout(DEADLINE, server).await.unwrap().unwrap();
}

// ---------------------------------------------------------------------------
// Test 4: the first segment a listener sees must be SYN
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_accept_rejects_data_before_syn() {
    init_tracing();

    let mut server = Connection::with_config(quick_config());
    let addr = server.listen(0).await.unwrap();

    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let segment = Segment::data(0, b"too early").unwrap();
    raw.send_to(&segment.encode(), addr).await.unwrap();

    let err = timeout(DEADLINE, server.accept()).await.unwrap().unwrap_err();
    assert!(err.is_handshake_error());
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        TransportError::UnexpectedSegment {
            expected: SegmentKind::Syn,
            actual: SegmentKind::Data
        }
    ));
    assert_eq!(server.phase(), ConnectionPhase::Init);
}

#[tokio::test]
async fn test_accept_rejects_garbage() {
    init_tracing();

    let mut server = Connection::with_config(quick_config());
    let addr = server.listen(0).await.unwrap();

    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    raw.send_to(&[1, 2, 3], addr).await.unwrap();

    let err = timeout(DEADLINE, server.accept()).await.unwrap().unwrap_err();
    assert!(err.is_handshake_error());
    assert!(matches!(err, TransportError::Segment(_)));
}
