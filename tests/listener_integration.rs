//! End-to-end listener behavior over loopback TCP.

mod common;

use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use handshake_gate::crypto::{Act, HandshakeError, ACT_ONE_SIZE};
use handshake_gate::{dial, ErrorKind, GateError, IdentityKey, Listener};

const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_good_peer_is_unaffected_by_garbage_peer() {
    let listener = common::start_listener(8, 1000).await;
    let addr = common::loopback(&listener);

    let client = IdentityKey::generate();
    let client_pub = client.public_key();
    let dialer = tokio::spawn(dial(client, listener.public_key(), addr, DIAL_TIMEOUT));

    let mut accepted = listener.accept().await.unwrap();
    let mut dialed = dialer.await.unwrap().unwrap();

    assert_eq!(accepted.remote_static(), client_pub);
    assert_eq!(dialed.remote_static(), listener.public_key());
    let ours = accepted.session_keys().unwrap();
    let theirs = dialed.session_keys().unwrap();
    assert_eq!(ours.recv, theirs.send);
    assert_eq!(ours.send, theirs.recv);

    let mut garbage = TcpStream::connect(addr).await.unwrap();
    garbage.write_all(&[0xff; ACT_ONE_SIZE]).await.unwrap();

    let err = listener.accept().await.unwrap_err();
    assert!(matches!(
        err,
        GateError::Handshake(HandshakeError::UnknownVersion { act: Act::One, version: 0xff })
    ));
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(common::closed_by_peer(&mut garbage, Duration::from_secs(1)).await);

    // The first connection is still usable.
    dialed.stream_mut().write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    accepted.stream_mut().read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");
}

#[tokio::test]
async fn test_dialer_with_wrong_server_key_is_rejected() {
    let listener = common::start_listener(4, 1000).await;
    let addr = common::loopback(&listener);

    let wrong = IdentityKey::generate().public_key();
    let dialer = tokio::spawn(dial(IdentityKey::generate(), wrong, addr, DIAL_TIMEOUT));

    let err = listener.accept().await.unwrap_err();
    assert!(matches!(err, GateError::Handshake(HandshakeError::BadTag { act: Act::One })));
    assert!(dialer.await.unwrap().is_err());
}

#[tokio::test]
async fn test_silent_peer_times_out_and_returns_token() {
    let listener = common::start_listener(4, 200).await;
    let addr = common::loopback(&listener);

    let start = Instant::now();
    let _silent = common::silent_peer(addr).await;

    let err = listener.accept().await.unwrap_err();
    assert!(err.is_timeout());
    assert!(matches!(err, GateError::Timeout { act: Act::One }));
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(start.elapsed() >= Duration::from_millis(150));

    assert!(common::wait_for_tokens(&listener, 3, Duration::from_secs(1)).await);
}

#[tokio::test]
async fn test_peer_stalled_on_act_three_does_not_block_others() {
    let listener = common::start_listener(4, 1500).await;
    let addr = common::loopback(&listener);

    let _stalled = common::stalled_after_act_one(addr, listener.public_key()).await;

    let client = IdentityKey::generate();
    let client_pub = client.public_key();
    let start = Instant::now();
    let dialer = tokio::spawn(dial(client, listener.public_key(), addr, DIAL_TIMEOUT));

    let first = listener.accept().await.unwrap();
    assert_eq!(first.remote_static(), client_pub);
    assert!(start.elapsed() < Duration::from_secs(1));
    dialer.await.unwrap().unwrap();

    let err = listener.accept().await.unwrap_err();
    assert!(matches!(err, GateError::Timeout { act: Act::Three }));
}

#[tokio::test]
async fn test_capacity_bounds_concurrent_handshakes() {
    let listener = common::start_listener(2, 400).await;
    let addr = common::loopback(&listener);

    let start = Instant::now();
    let _a = common::silent_peer(addr).await;
    let _b = common::silent_peer(addr).await;

    // Both tokens are held by stalled handshakes; the loop cannot take another.
    assert!(common::wait_for_tokens(&listener, 0, Duration::from_secs(1)).await);

    let client = IdentityKey::generate();
    let dialer = tokio::spawn(dial(client, listener.public_key(), addr, DIAL_TIMEOUT));

    let mut timeouts = 0;
    let mut secured_at = None;
    for _ in 0..3 {
        match listener.accept().await {
            Ok(_) => secured_at = Some(start.elapsed()),
            Err(e) if e.is_timeout() => timeouts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(timeouts, 2);
    let secured_at = secured_at.expect("third peer should be secured");
    assert!(secured_at >= Duration::from_millis(350));
    dialer.await.unwrap().unwrap();

    assert!(common::wait_for_tokens(&listener, 1, Duration::from_secs(1)).await);
}

#[tokio::test]
async fn test_close_is_idempotent_and_releases_blocked_accepts() {
    let listener = common::start_listener(4, 1000).await;

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let listener = listener.clone();
            tokio::spawn(async move { listener.accept().await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(listener.close().is_ok());
    for waiter in waiters {
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("accept should unblock on close")
            .unwrap();
        assert!(matches!(result, Err(GateError::Closed)));
    }

    assert!(listener.close().is_ok());
    assert!(listener.is_closed());
    let err = listener.accept().await.unwrap_err();
    assert!(err.is_closed());
    assert_eq!(err.kind(), ErrorKind::Lifecycle);
}

#[tokio::test]
async fn test_close_aborts_in_flight_handshakes_promptly() {
    let listener = common::start_listener(4, 10_000).await;
    let addr = common::loopback(&listener);

    let mut silent = common::silent_peer(addr).await;
    let mut stalled = common::stalled_after_act_one(addr, listener.public_key()).await;
    assert!(common::wait_for_tokens(&listener, 1, Duration::from_secs(1)).await);

    listener.close().unwrap();
    tokio::time::timeout(Duration::from_secs(2), listener.wait_drained())
        .await
        .expect("handshakes should abort well before their deadline");

    assert!(common::closed_by_peer(&mut silent, Duration::from_secs(1)).await);
    assert!(common::closed_by_peer(&mut stalled, Duration::from_secs(1)).await);
    assert!(listener.accept().await.unwrap_err().is_closed());
}

#[tokio::test]
async fn test_close_releases_port() {
    let listener = common::start_listener(4, 1000).await;
    let addr = common::loopback(&listener);

    listener.close().unwrap();
    // No yield in between: the socket is gone as soon as close returns.
    let connected = std::net::TcpStream::connect_timeout(&addr, Duration::from_millis(200));
    assert!(connected.is_err());

    tokio::time::timeout(Duration::from_secs(1), listener.wait_drained())
        .await
        .unwrap();
    let rebound = tokio::net::TcpListener::bind(addr).await;
    assert!(rebound.is_ok());
}

#[tokio::test]
async fn test_close_drops_secured_connection_nobody_accepted() {
    let listener = common::start_listener(4, 1000).await;
    let addr = common::loopback(&listener);

    let mut dialed = dial(IdentityKey::generate(), listener.public_key(), addr, DIAL_TIMEOUT)
        .await
        .unwrap();
    // Let the handshake task finish and start waiting for a consumer.
    tokio::time::sleep(Duration::from_millis(100)).await;

    listener.close().unwrap();
    tokio::time::timeout(Duration::from_secs(1), listener.wait_drained())
        .await
        .unwrap();

    assert!(common::closed_by_peer(dialed.stream_mut(), Duration::from_millis(500)).await);
}

#[tokio::test]
async fn test_drop_stops_accepting() {
    let listener = common::start_listener(4, 1000).await;
    let addr = common::loopback(&listener);
    drop(listener);

    let mut refused = false;
    for _ in 0..50 {
        if TcpStream::connect(addr).await.is_err() {
            refused = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(refused);
}

#[tokio::test]
async fn test_bind_uses_defaults() {
    let listener = Listener::bind(IdentityKey::generate(), 0).await.unwrap();
    assert_eq!(listener.capacity(), 1000);
    assert_ne!(listener.local_addr().port(), 0);
    assert!(common::wait_for_tokens(&listener, 999, Duration::from_secs(1)).await);
    listener.close().unwrap();
}
