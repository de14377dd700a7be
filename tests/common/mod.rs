//! Shared utilities for listener integration tests.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use handshake_gate::config::ListenerConfig;
use handshake_gate::crypto::{HandshakeMachine, ACT_TWO_SIZE};
use handshake_gate::{IdentityKey, Listener, PublicKey};

/// Bind a listener on an ephemeral loopback port.
pub async fn start_listener(max_handshakes: usize, handshake_timeout_ms: u64) -> Arc<Listener> {
    let config = ListenerConfig {
        bind_host: "127.0.0.1".into(),
        port: 0,
        max_handshakes,
        handshake_timeout_ms,
    };
    let listener = Listener::bind_with_config(IdentityKey::generate(), &config)
        .await
        .unwrap();
    Arc::new(listener)
}

pub fn loopback(listener: &Listener) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, listener.local_addr().port()))
}

/// A peer that connects and never writes.
pub async fn silent_peer(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(addr).await.unwrap()
}

/// A peer that sends a valid act one, reads act two and then goes quiet.
#[allow(dead_code)]
pub async fn stalled_after_act_one(addr: SocketAddr, remote: PublicKey) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut machine = HandshakeMachine::initiator(IdentityKey::generate(), remote);
    let act_one = machine.gen_act_one().unwrap();
    stream.write_all(&act_one).await.unwrap();

    let mut act_two = [0u8; ACT_TWO_SIZE];
    stream.read_exact(&mut act_two).await.unwrap();
    machine.recv_act_two(&act_two).unwrap();
    stream
}

/// Poll until the token pool holds `expected` tokens.
#[allow(dead_code)]
pub async fn wait_for_tokens(listener: &Listener, expected: usize, within: Duration) -> bool {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if listener.available_tokens() == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    listener.available_tokens() == expected
}

/// True once the remote side has closed `stream`.
#[allow(dead_code)]
pub async fn closed_by_peer(stream: &mut TcpStream, within: Duration) -> bool {
    let mut buf = [0u8; 64];
    match tokio::time::timeout(within, stream.read(&mut buf)).await {
        Ok(Ok(0)) | Ok(Err(_)) => true,
        Ok(Ok(_)) | Err(_) => false,
    }
}
