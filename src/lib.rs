//! Authenticated transport acceptor.
//!
//! Wraps a TCP listener so that `accept` only yields connections which have
//! completed a three-act mutual key exchange against our long-term identity
//! key.

pub mod config;
pub mod crypto;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;

pub use config::GateConfig;
pub use crypto::{IdentityKey, PublicKey};
pub use error::{ErrorKind, GateError};
pub use lifecycle::Shutdown;
pub use net::{dial, Listener, SecuredConnection};
