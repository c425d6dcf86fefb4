//! Key confirmation MAC (HMAC-SHA-512/256)

use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha512_256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CryptoError, CryptoResult, KEY_SIZE, MAC_SIZE};

type HmacSha512_256 = Hmac<Sha512_256>;

/// Single-use key proving the initiator opened the ServerHello box.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AuthKey {
    bytes: [u8; KEY_SIZE],
}

impl AuthKey {
    /// Generate a random authentication key
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

fn keyed(key: &AuthKey, message: &[u8]) -> CryptoResult<HmacSha512_256> {
    let mut mac = <HmacSha512_256 as Mac>::new_from_slice(key.as_bytes()).map_err(|_| {
        CryptoError::InvalidLength {
            what: "auth key",
            expected: KEY_SIZE,
            actual: key.as_bytes().len(),
        }
    })?;
    mac.update(message);
    Ok(mac)
}

/// Compute the confirmation tag over a public value.
pub fn authenticate(message: &[u8], key: &AuthKey) -> CryptoResult<[u8; MAC_SIZE]> {
    Ok(keyed(key, message)?.finalize().into_bytes().into())
}

/// Verify a confirmation tag in constant time.
pub fn verify(tag: &[u8], message: &[u8], key: &AuthKey) -> CryptoResult<()> {
    keyed(key, message)?
        .verify_slice(tag)
        .map_err(|_| CryptoError::DecryptionFailed)
}
