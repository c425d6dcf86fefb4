//! One-shot authenticated box keyed by the pre-shared key
//!
//! Only used during the handshake to carry fresh session keys.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::{BOX_NONCE_SIZE, CryptoError, CryptoResult, PresharedKey, TAG_SIZE};

/// Nonce for a single secret box, fresh per seal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxNonce(pub [u8; BOX_NONCE_SIZE]);

impl BoxNonce {
    /// Generate a random nonce
    pub fn generate() -> Self {
        let mut bytes = [0u8; BOX_NONCE_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; BOX_NONCE_SIZE] {
        &self.0
    }
}

/// Size of a sealed box for a plaintext of `len` bytes
pub const fn sealed_len(len: usize) -> usize {
    len + TAG_SIZE
}

/// Encrypt and authenticate `plaintext`.
///
/// Returns: [ciphertext][16-byte auth tag]
pub fn seal(plaintext: &[u8], nonce: &BoxNonce, key: &PresharedKey) -> CryptoResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .encrypt(XNonce::from_slice(nonce.as_bytes()), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))
}

/// Verify and decrypt a sealed box.
///
/// A wrong key and a corrupted box both yield [`CryptoError::DecryptionFailed`].
pub fn open(
    sealed: &[u8],
    nonce: &BoxNonce,
    key: &PresharedKey,
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    if sealed.len() < TAG_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(XNonce::from_slice(nonce.as_bytes()), sealed)
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::DecryptionFailed)
}
