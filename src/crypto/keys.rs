//! Long-term identity keys.
//!
//! A listener is addressed by the public half of its X25519 identity key;
//! dialers must know it in advance (the `XK` pattern).

use std::fmt;
use std::fs;
use std::path::Path;

use rand::rngs::OsRng;
use thiserror::Error;
use x25519_dalek::StaticSecret;

/// Size of identity keys in bytes.
pub const KEY_SIZE: usize = 32;

/// Errors loading or parsing key material.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to read key file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid hex key: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("key must be 32 bytes, got {0}")]
    Length(usize),
}

/// The public half of an identity key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; KEY_SIZE]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        Ok(Self(decode_key(s)?))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 hex characters, for log lines.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}...)", self.short_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<x25519_dalek::PublicKey> for PublicKey {
    fn from(key: x25519_dalek::PublicKey) -> Self {
        Self(key.to_bytes())
    }
}

impl From<PublicKey> for x25519_dalek::PublicKey {
    fn from(key: PublicKey) -> Self {
        x25519_dalek::PublicKey::from(key.0)
    }
}

/// A long-term X25519 identity key pair.
///
/// The secret is zeroized on drop.
#[derive(Clone)]
pub struct IdentityKey {
    secret: StaticSecret,
    public: PublicKey,
}

impl IdentityKey {
    /// Generate a new random identity from the OS RNG.
    pub fn generate() -> Self {
        Self::from_secret(StaticSecret::random_from_rng(OsRng))
    }

    pub fn from_bytes(secret: [u8; KEY_SIZE]) -> Self {
        Self::from_secret(StaticSecret::from(secret))
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let mut bytes = decode_key(s)?;
        let key = Self::from_bytes(bytes);
        zeroize::Zeroize::zeroize(&mut bytes);
        Ok(key)
    }

    /// Load a hex-encoded secret key from disk. Surrounding whitespace is ignored.
    pub fn load(path: &Path) -> Result<Self, KeyError> {
        let mut content = fs::read_to_string(path)?;
        let key = Self::from_hex(content.trim());
        zeroize::Zeroize::zeroize(&mut content);
        key
    }

    /// Write the hex-encoded secret key to disk.
    pub fn save(&self, path: &Path) -> Result<(), KeyError> {
        let mut encoded = hex::encode(self.secret.to_bytes());
        encoded.push('\n');
        let written = fs::write(path, encoded.as_bytes());
        zeroize::Zeroize::zeroize(&mut encoded);
        written?;
        Ok(())
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    pub(crate) fn secret(&self) -> &StaticSecret {
        &self.secret
    }

    fn from_secret(secret: StaticSecret) -> Self {
        let public = PublicKey::from(x25519_dalek::PublicKey::from(&secret));
        Self { secret, public }
    }
}

impl fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKey")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

fn decode_key(s: &str) -> Result<[u8; KEY_SIZE], KeyError> {
    let bytes = hex::decode(s)?;
    <[u8; KEY_SIZE]>::try_from(bytes.as_slice()).map_err(|_| KeyError::Length(bytes.len()))
}
