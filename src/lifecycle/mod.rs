//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     close() / drop / OS signal → fire once → accept loop exits,
//!     handshake tasks abort, blocked accept() calls fail
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → main closes the listener and drains
//! ```
//!
//! # Design Decisions
//! - One sticky signal; every blocking wait races against it
//! - Firing twice is a no-op
//! - Draining is bounded by the handshake deadline

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
