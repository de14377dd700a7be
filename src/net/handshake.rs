//! Per-connection responder handshake.
//!
//! # Responsibilities
//! - Drive the three acts over one accepted stream
//! - Bound both reads with the handshake deadline
//! - Report exactly one outcome, except when the listener is closing
//! - Hold the connection's token until the task ends, whatever the path
//!
//! ```text
//! Init → AwaitActOne → AwaitActThree → Secured
//!   └────────┴─────────────┴──────────→ Rejected
//! ```

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::OwnedSemaphorePermit;
use tracing::Instrument;

use crate::crypto::{Act, HandshakeError, HandshakeMachine, IdentityKey, ACT_ONE_SIZE, ACT_THREE_SIZE};
use crate::error::{GateError, Result};
use crate::lifecycle::Shutdown;
use crate::net::connection::{ConnectionId, SecuredConnection};
use crate::net::handoff::{Outcome, OutcomeSender};
use crate::observability::metrics;
use crate::resilience::timeouts::with_deadline;

/// A permit representing one handshake slot.
///
/// When dropped, the slot is released back to the pool. This keeps the
/// capacity accounting right even if the task panics or is aborted.
#[derive(Debug)]
pub(crate) struct HandshakeToken {
    _permit: OwnedSemaphorePermit,
}

impl HandshakeToken {
    pub(crate) fn new(permit: OwnedSemaphorePermit) -> Self {
        Self { _permit: permit }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeState {
    Init,
    AwaitActOne,
    AwaitActThree,
    Secured,
    Rejected,
}

fn enter(state: HandshakeState) {
    tracing::trace!(?state, "Handshake state");
}

/// Responder side of one handshake. Spawned by the accept loop.
pub(crate) struct HandshakeTask {
    identity: IdentityKey,
    timeout: Duration,
    shutdown: Shutdown,
    outcomes: OutcomeSender,
}

impl HandshakeTask {
    pub(crate) fn new(
        identity: IdentityKey,
        timeout: Duration,
        shutdown: Shutdown,
        outcomes: OutcomeSender,
    ) -> Self {
        Self {
            identity,
            timeout,
            shutdown,
            outcomes,
        }
    }

    pub(crate) async fn run(self, stream: TcpStream, peer_addr: SocketAddr, token: HandshakeToken) {
        let id = ConnectionId::new();
        let span = tracing::debug_span!("handshake", connection_id = %id, peer = %peer_addr);
        self.drive(id, stream, peer_addr, token).instrument(span).await
    }

    async fn drive(self, id: ConnectionId, stream: TcpStream, peer_addr: SocketAddr, _token: HandshakeToken) {
        enter(HandshakeState::Init);

        if self.shutdown.is_triggered() {
            enter(HandshakeState::Rejected);
            tracing::debug!("Listener closing, dropping connection before handshake");
            return;
        }

        let started = Instant::now();
        metrics::handshake_started();
        let result = self.respond(id, stream, peer_addr).await;
        let label = match &result {
            Ok(_) => "secured",
            Err(e) => e.label(),
        };
        metrics::handshake_finished(label, started.elapsed());

        match result {
            Ok(conn) => {
                enter(HandshakeState::Secured);
                tracing::debug!(
                    remote_static = %conn.remote_static().short_hex(),
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "Handshake complete"
                );
                if !self.outcomes.deliver(Outcome::Secured(conn)).await {
                    tracing::debug!("Listener closed before the connection was taken");
                }
            }
            Err(GateError::Closed) => {
                enter(HandshakeState::Rejected);
                tracing::debug!("Listener closing, handshake abandoned");
            }
            Err(e) => {
                enter(HandshakeState::Rejected);
                tracing::debug!(error = %e, "Handshake rejected");
                self.outcomes.deliver(Outcome::Rejected(e)).await;
            }
        }
    }

    /// Runs the acts. On any error the stream is dropped (closed) before the
    /// error reaches the caller.
    async fn respond(&self, id: ConnectionId, mut stream: TcpStream, peer_addr: SocketAddr) -> Result<SecuredConnection> {
        let mut machine = HandshakeMachine::responder(self.identity.clone());

        enter(HandshakeState::AwaitActOne);
        let mut act_one = [0u8; ACT_ONE_SIZE];
        self.guarded(read_act(&mut stream, Act::One, &mut act_one, self.timeout)).await?;
        // Fails here if the peer does not know our identity key.
        machine.recv_act_one(&act_one)?;

        let act_two = machine.gen_act_two()?;
        self.guarded(write_act(&mut stream, Act::Two, &act_two)).await?;

        if self.shutdown.is_triggered() {
            return Err(GateError::Closed);
        }

        enter(HandshakeState::AwaitActThree);
        let mut act_three = [0u8; ACT_THREE_SIZE];
        self.guarded(read_act(&mut stream, Act::Three, &mut act_three, self.timeout)).await?;
        machine.recv_act_three(&act_three)?;

        let remote_static = machine
            .remote_static()
            .ok_or(HandshakeError::InvalidKey { act: Act::Three })?;

        Ok(SecuredConnection::new(id, stream, peer_addr, remote_static, machine))
    }

    /// Races an I/O step against shutdown.
    async fn guarded<F, T>(&self, operation: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.shutdown.wait() => Err(GateError::Closed),
            result = operation => result,
        }
    }
}

/// Read exactly one act, bounded by `deadline`.
pub(crate) async fn read_act(stream: &mut TcpStream, act: Act, buf: &mut [u8], deadline: Duration) -> Result<()> {
    with_deadline(deadline, act, async {
        stream
            .read_exact(buf)
            .await
            .map(|_| ())
            .map_err(|e| GateError::from_read(act, e))
    })
    .await
}

/// Write one act in full.
pub(crate) async fn write_act(stream: &mut TcpStream, act: Act, bytes: &[u8]) -> Result<()> {
    stream
        .write_all(bytes)
        .await
        .map_err(|source| GateError::Io { act, source })
}
