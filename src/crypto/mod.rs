//! Handshake cryptography.
//!
//! # Data Flow
//! ```text
//! keys.rs       identity key pair (X25519), hex encoding, key files
//! symmetric.rs  chaining key + handshake hash, HKDF, ChaCha20-Poly1305
//! machine.rs    three-act XK state machine (initiator and responder)
//! ```
//!
//! # Design Decisions
//! - Fixed-size acts, no framing: readers know exactly how many bytes to expect
//! - Any handshake error is terminal for that machine
//! - Secret material is zeroized on drop

pub mod keys;
pub mod machine;
mod symmetric;

pub use keys::{IdentityKey, KeyError, PublicKey, KEY_SIZE};
pub use machine::{
    Act, HandshakeError, HandshakeMachine, Role, SessionKeys, ACT_ONE_SIZE, ACT_THREE_SIZE,
    ACT_TWO_SIZE, HANDSHAKE_VERSION,
};
