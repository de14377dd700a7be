//! Result channel between producers (accept loop, handshake tasks) and
//! `Listener::accept` callers.
//!
//! # Design Decisions
//! - Rendezvous: each `accept` call registers a one-shot slot and producers
//!   fill slots in registration order, so nothing is ever buffered
//! - Both sides race the shutdown signal; an outcome that was not handed over
//!   is dropped, closing its stream
//! - Producers take turns on a fair lock, so outcomes reach consumers in
//!   completion order

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};

use crate::error::{GateError, Result};
use crate::lifecycle::Shutdown;
use crate::net::connection::SecuredConnection;

/// The result of one accept or handshake attempt. Exactly one of the two.
#[derive(Debug)]
pub(crate) enum Outcome {
    Secured(SecuredConnection),
    Rejected(GateError),
}

impl Outcome {
    fn into_result(self) -> Result<SecuredConnection> {
        match self {
            Outcome::Secured(conn) => Ok(conn),
            Outcome::Rejected(err) => Err(err),
        }
    }
}

/// Producer half. Cheap to clone, one per handshake task.
#[derive(Clone)]
pub(crate) struct OutcomeSender {
    waiting: Arc<Mutex<mpsc::UnboundedReceiver<oneshot::Sender<Outcome>>>>,
    shutdown: Shutdown,
}

/// Consumer half. Shared by concurrent `accept` callers.
pub(crate) struct OutcomeReceiver {
    waiting: mpsc::UnboundedSender<oneshot::Sender<Outcome>>,
    shutdown: Shutdown,
}

pub(crate) fn channel(shutdown: Shutdown) -> (OutcomeSender, OutcomeReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        OutcomeSender {
            waiting: Arc::new(Mutex::new(rx)),
            shutdown: shutdown.clone(),
        },
        OutcomeReceiver { waiting: tx, shutdown },
    )
}

impl OutcomeSender {
    /// Hand `outcome` to a waiting consumer. Returns `false` if shutdown won
    /// the race; the outcome, and any connection in it, is dropped.
    pub(crate) async fn deliver(&self, mut outcome: Outcome) -> bool {
        let mut waiting = tokio::select! {
            biased;
            _ = self.shutdown.wait() => return false,
            waiting = self.waiting.lock() => waiting,
        };

        loop {
            let slot = tokio::select! {
                biased;
                _ = self.shutdown.wait() => return false,
                slot = waiting.recv() => slot,
            };
            let Some(slot) = slot else {
                return false;
            };
            // A consumer that gave up leaves a dead slot; try the next one.
            match slot.send(outcome) {
                Ok(()) => return true,
                Err(returned) => outcome = returned,
            }
        }
    }
}

impl OutcomeReceiver {
    /// Wait for the next outcome. Fails with [`GateError::Closed`] once the
    /// shutdown signal has fired.
    pub(crate) async fn recv(&self) -> Result<SecuredConnection> {
        if self.shutdown.is_triggered() {
            return Err(GateError::Closed);
        }

        let (slot, filled) = oneshot::channel();
        if self.waiting.send(slot).is_err() {
            return Err(GateError::Closed);
        }

        tokio::select! {
            biased;
            _ = self.shutdown.wait() => Err(GateError::Closed),
            outcome = filled => match outcome {
                Ok(outcome) => outcome.into_result(),
                Err(_) => Err(GateError::Closed),
            },
        }
    }
}
