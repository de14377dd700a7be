//! Noise symmetric state: chaining key, handshake hash and the AEAD used
//! to authenticate each act.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of a Poly1305 authentication tag.
pub const TAG_SIZE: usize = 16;

/// Errors from the AEAD primitive. Deliberately carries no detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CipherError;

/// Builds the 96-bit nonce: 32 zero bits followed by the little-endian counter.
fn nonce(counter: u64) -> Nonce {
    let mut bytes = [0u8; 12];
    bytes[4..].copy_from_slice(&counter.to_le_bytes());
    Nonce::from(bytes)
}

pub(crate) fn seal(key: &[u8; 32], counter: u64, ad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| CipherError)?;
    cipher
        .encrypt(&nonce(counter), Payload { msg: plaintext, aad: ad })
        .map_err(|_| CipherError)
}

pub(crate) fn open(key: &[u8; 32], counter: u64, ad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
    if ciphertext.len() < TAG_SIZE {
        return Err(CipherError);
    }
    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| CipherError)?;
    cipher
        .decrypt(&nonce(counter), Payload { msg: ciphertext, aad: ad })
        .map_err(|_| CipherError)
}

/// HKDF-SHA256 keyed by `salt`, expanded to two 32-byte halves.
fn hkdf2(salt: &[u8; 32], ikm: &[u8]) -> ([u8; 32], [u8; 32]) {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = [0u8; 64];
    // 64 bytes is far below the 255 * HashLen HKDF limit.
    let _ = hk.expand(&[], &mut okm);

    let mut first = [0u8; 32];
    let mut second = [0u8; 32];
    first.copy_from_slice(&okm[..32]);
    second.copy_from_slice(&okm[32..]);
    okm.zeroize();
    (first, second)
}

/// Chaining key and running handshake hash.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct SymmetricState {
    chaining_key: [u8; 32],
    hash: [u8; 32],
}

impl SymmetricState {
    /// Initializes both the chaining key and the hash to `SHA256(protocol_name)`.
    pub(crate) fn new(protocol_name: &[u8]) -> Self {
        let digest: [u8; 32] = Sha256::digest(protocol_name).into();
        Self {
            chaining_key: digest,
            hash: digest,
        }
    }

    pub(crate) fn mix_hash(&mut self, data: &[u8]) {
        let mut hasher = Sha256::new();
        hasher.update(self.hash);
        hasher.update(data);
        self.hash = hasher.finalize().into();
    }

    /// Mixes DH output into the chaining key and returns the fresh temporary key.
    pub(crate) fn mix_key(&mut self, input: &[u8]) -> [u8; 32] {
        let (chaining_key, temp_key) = hkdf2(&self.chaining_key, input);
        self.chaining_key = chaining_key;
        temp_key
    }

    pub(crate) fn encrypt_and_hash(
        &mut self,
        key: &[u8; 32],
        counter: u64,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CipherError> {
        let ciphertext = seal(key, counter, &self.hash, plaintext)?;
        self.mix_hash(&ciphertext);
        Ok(ciphertext)
    }

    pub(crate) fn decrypt_and_hash(
        &mut self,
        key: &[u8; 32],
        counter: u64,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CipherError> {
        let plaintext = open(key, counter, &self.hash, ciphertext)?;
        self.mix_hash(ciphertext);
        Ok(plaintext)
    }

    /// Derives the two transport keys (initiator→responder, responder→initiator).
    pub(crate) fn split(&self) -> ([u8; 32], [u8; 32]) {
        hkdf2(&self.chaining_key, &[])
    }

    #[cfg(test)]
    pub(crate) fn hash(&self) -> [u8; 32] {
        self.hash
    }
}
