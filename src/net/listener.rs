//! Authenticated TCP listener with bounded handshake concurrency.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept raw TCP connections, one token per connection
//! - Hand each connection to its own handshake task without waiting on it
//! - Deliver outcomes to `accept` callers; close idempotently
//!
//! A peer that connects and then stays silent costs one token until its
//! deadline expires; it never blocks the accept loop.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{watch, Semaphore};

use crate::config::schema::{max_handshakes_limit, ListenerConfig};
use crate::crypto::{IdentityKey, PublicKey};
use crate::error::{GateError, Result};
use crate::lifecycle::Shutdown;
use crate::net::connection::SecuredConnection;
use crate::net::handoff::{self, Outcome, OutcomeReceiver, OutcomeSender};
use crate::net::handshake::{HandshakeTask, HandshakeToken};
use crate::net::raw::{RawListener, SocketSlot};
use crate::observability::metrics;
use crate::resilience::backoff::AcceptBackoff;

/// A listener that only yields connections which completed the handshake.
///
/// Dropping the listener has the same effect as [`Listener::close`].
pub struct Listener {
    local_addr: SocketAddr,
    public_key: PublicKey,
    /// Token pool bounding concurrent handshakes.
    tokens: Arc<Semaphore>,
    capacity: usize,
    outcomes: OutcomeReceiver,
    shutdown: Shutdown,
    socket: Arc<SocketSlot>,
    /// Errors on `changed()` once the accept loop has returned.
    loop_stopped: watch::Receiver<()>,
}

impl Listener {
    /// Bind on all interfaces at `port` with the default capacity and deadline.
    pub async fn bind(identity: IdentityKey, port: u16) -> Result<Self> {
        Self::bind_with_config(identity, &ListenerConfig::with_port(port)).await
    }

    /// Bind with explicit capacity and deadline and start the accept loop.
    pub async fn bind_with_config(identity: IdentityKey, config: &ListenerConfig) -> Result<Self> {
        let addr = config
            .socket_addr()
            .map_err(|e| GateError::Bind(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
        check_capacity(config.max_handshakes)?;

        let tcp = TcpListener::bind(addr).await.map_err(GateError::Bind)?;
        Self::from_raw(tcp, identity, config)
    }

    /// Serve handshakes on an already bound raw listener. `bind_host` and
    /// `port` in `config` are ignored.
    pub fn from_raw<L: RawListener>(raw: L, identity: IdentityKey, config: &ListenerConfig) -> Result<Self> {
        let capacity = config.max_handshakes;
        check_capacity(capacity)?;
        let local_addr = raw.local_addr().map_err(GateError::Bind)?;
        let socket = Arc::new(SocketSlot::new(Box::new(raw)));

        let public_key = identity.public_key();
        let shutdown = Shutdown::new();
        let tokens = Arc::new(Semaphore::new(capacity));
        let (sender, receiver) = handoff::channel(shutdown.clone());
        let (stopped_tx, loop_stopped) = watch::channel(());

        tracing::info!(
            address = %local_addr,
            public_key = %public_key,
            max_handshakes = capacity,
            handshake_timeout_ms = config.handshake_timeout_ms,
            "Listener bound"
        );

        let accept_loop = AcceptLoop {
            socket: Arc::clone(&socket),
            local_addr,
            identity,
            tokens: Arc::clone(&tokens),
            handshake_timeout: config.handshake_timeout(),
            shutdown: shutdown.clone(),
            outcomes: sender,
            backoff: AcceptBackoff::default(),
            _stopped: stopped_tx,
        };
        tokio::spawn(accept_loop.run());

        Ok(Self {
            local_addr,
            public_key,
            tokens,
            capacity,
            outcomes: receiver,
            shutdown,
            socket,
            loop_stopped,
        })
    }

    /// Wait for the next handshake outcome.
    ///
    /// Returns the next secured connection, or the error that ended a failed
    /// accept or handshake; in that case just call `accept` again. Outcomes
    /// arrive in the order handshakes finish. Fails with [`GateError::Closed`]
    /// once the listener is closed.
    pub async fn accept(&self) -> Result<SecuredConnection> {
        self.outcomes.recv().await
    }

    /// Stop accepting. Idempotent; every call returns `Ok(())`.
    ///
    /// The TCP socket is closed before this returns. Blocked `accept` calls
    /// fail with [`GateError::Closed`] and in-flight handshakes abort without
    /// reporting.
    pub fn close(&self) -> Result<()> {
        let fired = self.shutdown.trigger();
        self.socket.close();
        if fired {
            tracing::info!(address = %self.local_addr, "Listener closed");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Resolves once the accept loop has stopped and every token is back in
    /// the pool. Only meaningful after `close`.
    pub async fn wait_drained(&self) {
        let mut stopped = self.loop_stopped.clone();
        while stopped.changed().await.is_ok() {}

        let all = u32::try_from(self.capacity).unwrap_or(u32::MAX);
        // The pool is never closed, so this only fails if it somehow is;
        // either way nothing is left to wait for.
        let _ = self.tokens.acquire_many(all).await;
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Configured maximum concurrent handshakes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tokens currently in the pool. The accept loop holds one while it waits
    /// for a connection, so an idle open listener reports `capacity - 1`.
    pub fn available_tokens(&self) -> usize {
        self.tokens.available_permits()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.shutdown.trigger();
        self.socket.close();
    }
}

fn check_capacity(capacity: usize) -> Result<()> {
    if capacity == 0 || capacity > max_handshakes_limit() {
        return Err(GateError::Bind(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("max_handshakes must be between 1 and {}", max_handshakes_limit()),
        )));
    }
    Ok(())
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("local_addr", &self.local_addr)
            .field("public_key", &self.public_key)
            .field("capacity", &self.capacity)
            .field("available_tokens", &self.available_tokens())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Takes tokens and raw connections and spawns a handshake task for each.
struct AcceptLoop {
    socket: Arc<SocketSlot>,
    local_addr: SocketAddr,
    identity: IdentityKey,
    tokens: Arc<Semaphore>,
    handshake_timeout: Duration,
    shutdown: Shutdown,
    outcomes: OutcomeSender,
    backoff: AcceptBackoff,
    _stopped: watch::Sender<()>,
}

impl AcceptLoop {
    async fn run(mut self) {
        loop {
            // Token first (backpressure), then the connection.
            let token = tokio::select! {
                biased;
                _ = self.shutdown.wait() => break,
                permit = Arc::clone(&self.tokens).acquire_owned() => match permit {
                    Ok(permit) => HandshakeToken::new(permit),
                    Err(_) => break,
                },
            };

            let accepted = tokio::select! {
                biased;
                _ = self.shutdown.wait() => break,
                accepted = self.socket.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    self.backoff.reset();
                    tracing::trace!(
                        peer = %peer_addr,
                        available_tokens = self.tokens.available_permits(),
                        "Connection accepted"
                    );

                    let task = HandshakeTask::new(
                        self.identity.clone(),
                        self.handshake_timeout,
                        self.shutdown.clone(),
                        self.outcomes.clone(),
                    );
                    tokio::spawn(task.run(stream, peer_addr, token));
                }
                Err(e) => {
                    metrics::accept_failed();
                    let delay = self.backoff.record_failure();
                    tracing::warn!(
                        error = %e,
                        consecutive_failures = self.backoff.failures(),
                        "Failed to accept connection"
                    );

                    self.outcomes.deliver(Outcome::Rejected(GateError::Accept(e))).await;
                    drop(token);

                    tokio::select! {
                        biased;
                        _ = self.shutdown.wait() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.socket.close();
        tracing::debug!(address = %self.local_addr, "Accept loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};

    use tokio::net::TcpStream;

    use crate::error::ErrorKind;
    use crate::net::dial::dial;

    /// Fails the first `failures` accepts, then defers to a real socket.
    struct FailingAccepts {
        inner: TcpListener,
        failures: AtomicUsize,
    }

    impl RawListener for FailingAccepts {
        fn poll_accept(&self, cx: &mut Context<'_>) -> Poll<io::Result<(TcpStream, SocketAddr)>> {
            let failed = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "too many open files")));
            }
            self.inner.poll_accept(cx)
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            self.inner.local_addr()
        }
    }

    async fn wait_for_tokens(listener: &Listener, expected: usize) -> bool {
        for _ in 0..100 {
            if listener.available_tokens() == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    fn config(max_handshakes: usize) -> ListenerConfig {
        ListenerConfig {
            max_handshakes,
            ..ListenerConfig::with_port(0)
        }
    }

    #[tokio::test]
    async fn accept_failure_is_reported_and_loop_continues() {
        let raw = FailingAccepts {
            inner: TcpListener::bind("127.0.0.1:0").await.unwrap(),
            failures: AtomicUsize::new(1),
        };
        let listener = Listener::from_raw(raw, IdentityKey::generate(), &config(4)).unwrap();

        let err = listener.accept().await.unwrap_err();
        assert!(matches!(err, GateError::Accept(_)));
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(wait_for_tokens(&listener, 3).await);

        let dialer = tokio::spawn(dial(
            IdentityKey::generate(),
            listener.public_key(),
            listener.local_addr(),
            Duration::from_secs(5),
        ));
        let conn = listener.accept().await.unwrap();
        let dialed = dialer.await.unwrap().unwrap();
        assert_eq!(dialed.remote_static(), listener.public_key());
        assert_eq!(conn.peer_addr(), dialed.local_addr().unwrap());
    }

    #[tokio::test]
    async fn rejects_zero_capacity() {
        let raw = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let err = Listener::from_raw(raw, IdentityKey::generate(), &config(0)).unwrap_err();
        assert!(matches!(err, GateError::Bind(_)));
    }

    #[tokio::test]
    async fn close_drops_socket_before_returning() {
        let raw = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let listener = Listener::from_raw(raw, IdentityKey::generate(), &config(4)).unwrap();
        let addr = listener.local_addr();

        listener.close().unwrap();
        assert!(std::net::TcpStream::connect_timeout(&addr, Duration::from_millis(200)).is_err());
    }
}
