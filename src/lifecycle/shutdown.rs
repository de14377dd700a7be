//! Shutdown coordination for the listener.

use std::sync::Arc;

use tokio::sync::watch;

/// One-shot shutdown signal shared by the accept loop, handshake tasks and
/// accept callers.
///
/// Backed by a watch channel so the signal is sticky: waiters that subscribe
/// after it fired still observe it. Firing is idempotent.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    /// Create a new, unfired shutdown signal.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal. Returns `true` only for the call that actually fired it.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|closed| {
            if *closed {
                return false;
            }
            *closed = true;
            true
        })
    }

    /// Non-blocking check.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the signal has fired (immediately if it already has).
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns Ok.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
