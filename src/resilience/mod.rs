//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Handshake read:
//!     → timeouts.rs (per-act deadline)
//! Raw accept failure:
//!     → backoff.rs (pause before the next accept, grows with the streak)
//! ```
//!
//! # Design Decisions
//! - Every read from an untrusted peer has a deadline
//! - Handshakes are never retried; only the accept loop backs off

pub mod backoff;
pub mod timeouts;
