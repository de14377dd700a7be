//! Three-act authenticated key exchange.
//!
//! Noise `XK` over X25519, ChaCha20-Poly1305 and SHA-256. The initiator must
//! already know the responder's static key; the responder learns the
//! initiator's static key in act three.
//!
//! ```text
//! Initiator                                   Responder
//!   │  act one:   ver ‖ e ‖ tag           (49)    │   -> e, es
//!   │ ──────────────────────────────────────────▶ │
//!   │  act two:   ver ‖ e ‖ tag           (49)    │   <- e, ee
//!   │ ◀────────────────────────────────────────── │
//!   │  act three: ver ‖ enc(s) ‖ tag      (65)    │   -> s, se
//!   │ ──────────────────────────────────────────▶ │
//! ```
//!
//! Acts carry no length prefix; both sides read the fixed sizes below.

use std::fmt;

use rand::rngs::OsRng;
use thiserror::Error;
use x25519_dalek::StaticSecret;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::keys::{IdentityKey, PublicKey, KEY_SIZE};
use super::symmetric::{SymmetricState, TAG_SIZE};

const PROTOCOL_NAME: &[u8] = b"Noise_XK_25519_ChaChaPoly_SHA256";
const PROLOGUE: &[u8] = b"handshake-gate";

/// The only handshake version this implementation speaks.
pub const HANDSHAKE_VERSION: u8 = 0;

pub const ACT_ONE_SIZE: usize = 1 + KEY_SIZE + TAG_SIZE;
pub const ACT_TWO_SIZE: usize = 1 + KEY_SIZE + TAG_SIZE;
pub const ACT_THREE_SIZE: usize = 1 + KEY_SIZE + TAG_SIZE + TAG_SIZE;

/// One of the three handshake messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Act {
    One,
    Two,
    Three,
}

impl fmt::Display for Act {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Act::One => "one",
            Act::Two => "two",
            Act::Three => "three",
        })
    }
}

/// Which side of the handshake a machine plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// Protocol-level handshake failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("act {act}: unknown handshake version {version}")]
    UnknownVersion { act: Act, version: u8 },

    #[error("act {act}: invalid public key")]
    InvalidKey { act: Act },

    #[error("act {act}: authentication failed")]
    BadTag { act: Act },

    #[error("act {act} is not valid for a {role:?} in the current handshake state")]
    OutOfOrder { act: Act, role: Role },

    #[error("act {act}: encryption failed")]
    Cipher { act: Act },
}

/// Transport keys produced by a completed handshake.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    pub send: [u8; 32],
    pub recv: [u8; 32],
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKeys(..)")
    }
}

/// Next act each side expects to produce or consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    ActOne,
    ActTwo,
    ActThree,
    Complete,
}

/// State machine for one side of a handshake.
///
/// Create one per connection; it is consumed by a single handshake attempt.
pub struct HandshakeMachine {
    role: Role,
    stage: Stage,
    local_static: IdentityKey,
    remote_static: Option<PublicKey>,
    local_ephemeral: Option<StaticSecret>,
    remote_ephemeral: Option<PublicKey>,
    symmetric: SymmetricState,
    // Key from act two; encrypts the initiator's static key in act three.
    temp_key: [u8; 32],
    session_keys: Option<SessionKeys>,
}

impl HandshakeMachine {
    /// A responder bound to our identity key.
    pub fn responder(local_static: IdentityKey) -> Self {
        let responder_static = local_static.public_key();
        Self::new(Role::Responder, local_static, None, responder_static)
    }

    /// An initiator that expects to reach `remote_static`.
    pub fn initiator(local_static: IdentityKey, remote_static: PublicKey) -> Self {
        Self::new(Role::Initiator, local_static, Some(remote_static), remote_static)
    }

    fn new(
        role: Role,
        local_static: IdentityKey,
        remote_static: Option<PublicKey>,
        responder_static: PublicKey,
    ) -> Self {
        let mut symmetric = SymmetricState::new(PROTOCOL_NAME);
        symmetric.mix_hash(PROLOGUE);
        // Pre-message: <- s
        symmetric.mix_hash(responder_static.as_bytes());

        Self {
            role,
            stage: Stage::ActOne,
            local_static,
            remote_static,
            local_ephemeral: None,
            remote_ephemeral: None,
            symmetric,
            temp_key: [0u8; 32],
            session_keys: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_complete(&self) -> bool {
        self.stage == Stage::Complete
    }

    /// The peer's static key. Known up front for an initiator, after act three
    /// for a responder.
    pub fn remote_static(&self) -> Option<PublicKey> {
        self.remote_static
    }

    /// Transport keys, once the handshake is complete.
    pub fn session_keys(&self) -> Option<&SessionKeys> {
        self.session_keys.as_ref()
    }

    /// Initiator: -> e, es
    pub fn gen_act_one(&mut self) -> Result<[u8; ACT_ONE_SIZE], HandshakeError> {
        self.expect(Act::One, Role::Initiator, Stage::ActOne)?;
        let remote_static = self.remote_static.ok_or(HandshakeError::InvalidKey { act: Act::One })?;

        let ephemeral = StaticSecret::random_from_rng(OsRng);
        let ephemeral_public = PublicKey::from(x25519_dalek::PublicKey::from(&ephemeral));
        self.symmetric.mix_hash(ephemeral_public.as_bytes());

        let es = dh(&ephemeral, remote_static, Act::One)?;
        let temp_key = self.symmetric.mix_key(&es);
        let tag = self
            .symmetric
            .encrypt_and_hash(&temp_key, 0, &[])
            .map_err(|_| HandshakeError::Cipher { act: Act::One })?;

        let mut act = [0u8; ACT_ONE_SIZE];
        act[0] = HANDSHAKE_VERSION;
        act[1..1 + KEY_SIZE].copy_from_slice(ephemeral_public.as_bytes());
        act[1 + KEY_SIZE..].copy_from_slice(&tag);

        self.local_ephemeral = Some(ephemeral);
        self.stage = Stage::ActTwo;
        Ok(act)
    }

    /// Responder: consumes act one. Fails if the initiator does not know our
    /// static key.
    pub fn recv_act_one(&mut self, act: &[u8; ACT_ONE_SIZE]) -> Result<(), HandshakeError> {
        self.expect(Act::One, Role::Responder, Stage::ActOne)?;
        check_version(Act::One, act[0])?;

        let remote_ephemeral = read_key(&act[1..1 + KEY_SIZE]);
        self.symmetric.mix_hash(remote_ephemeral.as_bytes());

        let es = dh(self.local_static.secret(), remote_ephemeral, Act::One)?;
        let temp_key = self.symmetric.mix_key(&es);
        self.symmetric
            .decrypt_and_hash(&temp_key, 0, &act[1 + KEY_SIZE..])
            .map_err(|_| HandshakeError::BadTag { act: Act::One })?;

        self.remote_ephemeral = Some(remote_ephemeral);
        self.stage = Stage::ActTwo;
        Ok(())
    }

    /// Responder: <- e, ee
    pub fn gen_act_two(&mut self) -> Result<[u8; ACT_TWO_SIZE], HandshakeError> {
        self.expect(Act::Two, Role::Responder, Stage::ActTwo)?;
        let remote_ephemeral = self.remote_ephemeral.ok_or(HandshakeError::InvalidKey { act: Act::Two })?;

        let ephemeral = StaticSecret::random_from_rng(OsRng);
        let ephemeral_public = PublicKey::from(x25519_dalek::PublicKey::from(&ephemeral));
        self.symmetric.mix_hash(ephemeral_public.as_bytes());

        let ee = dh(&ephemeral, remote_ephemeral, Act::Two)?;
        self.temp_key = self.symmetric.mix_key(&ee);
        let tag = self
            .symmetric
            .encrypt_and_hash(&self.temp_key, 0, &[])
            .map_err(|_| HandshakeError::Cipher { act: Act::Two })?;

        let mut act = [0u8; ACT_TWO_SIZE];
        act[0] = HANDSHAKE_VERSION;
        act[1..1 + KEY_SIZE].copy_from_slice(ephemeral_public.as_bytes());
        act[1 + KEY_SIZE..].copy_from_slice(&tag);

        self.local_ephemeral = Some(ephemeral);
        self.stage = Stage::ActThree;
        Ok(act)
    }

    /// Initiator: consumes act two.
    pub fn recv_act_two(&mut self, act: &[u8; ACT_TWO_SIZE]) -> Result<(), HandshakeError> {
        self.expect(Act::Two, Role::Initiator, Stage::ActTwo)?;
        check_version(Act::Two, act[0])?;

        let remote_ephemeral = read_key(&act[1..1 + KEY_SIZE]);
        self.symmetric.mix_hash(remote_ephemeral.as_bytes());

        let local_ephemeral = self
            .local_ephemeral
            .as_ref()
            .ok_or(HandshakeError::OutOfOrder { act: Act::Two, role: self.role })?;
        let ee = dh(local_ephemeral, remote_ephemeral, Act::Two)?;
        self.temp_key = self.symmetric.mix_key(&ee);
        self.symmetric
            .decrypt_and_hash(&self.temp_key, 0, &act[1 + KEY_SIZE..])
            .map_err(|_| HandshakeError::BadTag { act: Act::Two })?;

        self.remote_ephemeral = Some(remote_ephemeral);
        self.stage = Stage::ActThree;
        Ok(())
    }

    /// Initiator: -> s, se. Completes the handshake on this side.
    pub fn gen_act_three(&mut self) -> Result<[u8; ACT_THREE_SIZE], HandshakeError> {
        self.expect(Act::Three, Role::Initiator, Stage::ActThree)?;
        let remote_ephemeral = self.remote_ephemeral.ok_or(HandshakeError::InvalidKey { act: Act::Three })?;

        let local_public = self.local_static.public_key();
        let encrypted_static = self
            .symmetric
            .encrypt_and_hash(&self.temp_key, 1, local_public.as_bytes())
            .map_err(|_| HandshakeError::Cipher { act: Act::Three })?;

        let se = dh(self.local_static.secret(), remote_ephemeral, Act::Three)?;
        let temp_key = self.symmetric.mix_key(&se);
        let tag = self
            .symmetric
            .encrypt_and_hash(&temp_key, 0, &[])
            .map_err(|_| HandshakeError::Cipher { act: Act::Three })?;

        let mut act = [0u8; ACT_THREE_SIZE];
        act[0] = HANDSHAKE_VERSION;
        act[1..1 + KEY_SIZE + TAG_SIZE].copy_from_slice(&encrypted_static);
        act[1 + KEY_SIZE + TAG_SIZE..].copy_from_slice(&tag);

        let (send, recv) = self.symmetric.split();
        self.finish(SessionKeys { send, recv });
        Ok(act)
    }

    /// Responder: consumes act three. Success means both sides proved
    /// possession of their static keys.
    pub fn recv_act_three(&mut self, act: &[u8; ACT_THREE_SIZE]) -> Result<(), HandshakeError> {
        self.expect(Act::Three, Role::Responder, Stage::ActThree)?;
        check_version(Act::Three, act[0])?;

        let static_bytes = self
            .symmetric
            .decrypt_and_hash(&self.temp_key, 1, &act[1..1 + KEY_SIZE + TAG_SIZE])
            .map_err(|_| HandshakeError::BadTag { act: Act::Three })?;
        let remote_static = read_key(&static_bytes);

        let local_ephemeral = self
            .local_ephemeral
            .as_ref()
            .ok_or(HandshakeError::OutOfOrder { act: Act::Three, role: self.role })?;
        let se = dh(local_ephemeral, remote_static, Act::Three)?;
        let temp_key = self.symmetric.mix_key(&se);
        self.symmetric
            .decrypt_and_hash(&temp_key, 0, &act[1 + KEY_SIZE + TAG_SIZE..])
            .map_err(|_| HandshakeError::BadTag { act: Act::Three })?;

        self.remote_static = Some(remote_static);
        let (recv, send) = self.symmetric.split();
        self.finish(SessionKeys { send, recv });
        Ok(())
    }

    fn expect(&self, act: Act, role: Role, stage: Stage) -> Result<(), HandshakeError> {
        if self.role != role || self.stage != stage {
            return Err(HandshakeError::OutOfOrder { act, role: self.role });
        }
        Ok(())
    }

    fn finish(&mut self, keys: SessionKeys) {
        self.session_keys = Some(keys);
        self.local_ephemeral = None;
        self.temp_key.zeroize();
        self.stage = Stage::Complete;
    }
}

impl fmt::Debug for HandshakeMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeMachine")
            .field("role", &self.role)
            .field("stage", &self.stage)
            .field("remote_static", &self.remote_static)
            .finish_non_exhaustive()
    }
}

impl Drop for HandshakeMachine {
    fn drop(&mut self) {
        self.temp_key.zeroize();
    }
}

fn check_version(act: Act, version: u8) -> Result<(), HandshakeError> {
    if version != HANDSHAKE_VERSION {
        return Err(HandshakeError::UnknownVersion { act, version });
    }
    Ok(())
}

fn read_key(bytes: &[u8]) -> PublicKey {
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&bytes[..KEY_SIZE]);
    PublicKey::from_bytes(key)
}

/// X25519 that rejects low-order points.
fn dh(secret: &StaticSecret, public: PublicKey, act: Act) -> Result<[u8; 32], HandshakeError> {
    let shared = secret.diffie_hellman(&x25519_dalek::PublicKey::from(public));
    if !shared.was_contributory() {
        return Err(HandshakeError::InvalidKey { act });
    }
    Ok(shared.to_bytes())
}
