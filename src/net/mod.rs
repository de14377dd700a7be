//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → raw.rs (raw socket, closed synchronously by close())
//!     → listener.rs (token pool, accept loop)
//!     → handshake.rs (one task per connection, three acts with deadlines)
//!     → handoff.rs (rendezvous with an accept() caller)
//!     → connection.rs (SecuredConnection handed to the application)
//!
//! Outgoing:
//!     dial.rs (connect, initiator acts) → SecuredConnection
//! ```
//!
//! # Design Decisions
//! - Bounded handshake concurrency prevents resource exhaustion
//! - Slow peers only ever hold their own token
//! - Every blocking step races the listener's shutdown signal

pub mod connection;
pub mod dial;
mod handoff;
mod handshake;
pub mod listener;
pub mod raw;

pub use connection::{ConnectionId, SecuredConnection};
pub use dial::dial;
pub use listener::Listener;
pub use raw::RawListener;
