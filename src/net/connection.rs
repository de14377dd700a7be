//! Secured connections and connection identifiers.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Bundle a raw stream with the keyed handshake machine once all three
//!   acts succeed

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::TcpStream;

use crate::crypto::{HandshakeMachine, PublicKey, Role, SessionKeys};

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A connection on which the three-act handshake has completed.
///
/// Owned by whoever received it from `accept` or `dial`; it does not borrow
/// from the listener. Application-level encryption over the stream is left to
/// the owner, using [`SecuredConnection::session_keys`].
#[derive(Debug)]
pub struct SecuredConnection {
    id: ConnectionId,
    stream: TcpStream,
    peer_addr: SocketAddr,
    remote_static: PublicKey,
    machine: HandshakeMachine,
}

impl SecuredConnection {
    pub(crate) fn new(
        id: ConnectionId,
        stream: TcpStream,
        peer_addr: SocketAddr,
        remote_static: PublicKey,
        machine: HandshakeMachine,
    ) -> Self {
        Self {
            id,
            stream,
            peer_addr,
            remote_static,
            machine,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    /// The authenticated long-term key of the other side.
    pub fn remote_static(&self) -> PublicKey {
        self.remote_static
    }

    /// Which side of the handshake we played.
    pub fn role(&self) -> Role {
        self.machine.role()
    }

    pub fn session_keys(&self) -> Option<&SessionKeys> {
        self.machine.session_keys()
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Split into the raw stream and the completed machine.
    pub fn into_parts(self) -> (TcpStream, HandshakeMachine) {
        (self.stream, self.machine)
    }
}
