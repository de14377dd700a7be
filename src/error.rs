//! Error type for listener and dialer operations.

use std::io;

use thiserror::Error;

use crate::crypto::{Act, HandshakeError};

/// Broad classification of a [`GateError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bind, accept, connect, read, write or deadline failures.
    Transport,
    /// Malformed or cryptographically failing acts, short reads.
    Protocol,
    /// The listener was closed.
    Lifecycle,
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("failed to bind: {0}")]
    Bind(#[source] io::Error),

    #[error("failed to accept: {0}")]
    Accept(#[source] io::Error),

    #[error("failed to connect: {0}")]
    Connect(#[source] io::Error),

    #[error("timed out waiting for act {act}")]
    Timeout { act: Act },

    #[error("peer closed the connection before completing act {act}")]
    ShortRead { act: Act },

    #[error("i/o error during act {act}: {source}")]
    Io { act: Act, source: io::Error },

    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("listener closed")]
    Closed,
}

impl GateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GateError::Bind(_)
            | GateError::Accept(_)
            | GateError::Connect(_)
            | GateError::Timeout { .. }
            | GateError::Io { .. } => ErrorKind::Transport,
            GateError::ShortRead { .. } | GateError::Handshake(_) => ErrorKind::Protocol,
            GateError::Closed => ErrorKind::Lifecycle,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, GateError::Timeout { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, GateError::Closed)
    }

    /// Classifies a failed read of a fixed-size act.
    pub(crate) fn from_read(act: Act, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => GateError::ShortRead { act },
            io::ErrorKind::TimedOut => GateError::Timeout { act },
            _ => GateError::Io { act, source: err },
        }
    }

    /// Short label for metrics and logs.
    pub(crate) fn label(&self) -> &'static str {
        match self {
            GateError::Bind(_) => "bind",
            GateError::Accept(_) => "accept",
            GateError::Connect(_) => "connect",
            GateError::Timeout { .. } => "timeout",
            GateError::ShortRead { .. } => "short_read",
            GateError::Io { .. } => "io",
            GateError::Handshake(_) => "handshake",
            GateError::Closed => "closed",
        }
    }
}

pub type Result<T> = std::result::Result<T, GateError>;
