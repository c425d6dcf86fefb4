//! Password key derivation: Argon2id password + salt → pre-shared key

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CryptoError, CryptoResult, KEY_SIZE, SALT_SIZE};

/// Symmetric key both peers derive from the shared password.
///
/// Never transmitted; recomputed by each side from the public salt.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PresharedKey {
    bytes: [u8; KEY_SIZE],
}

impl PresharedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for PresharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresharedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Argon2id cost parameters.
///
/// Both peers must use the same values; they are not negotiated on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub passes: u32,
    /// Degree of parallelism
    pub lanes: u32,
}

impl KdfParams {
    /// Interactive-strength parameters: 64 MiB, 2 passes, 1 lane.
    pub const fn interactive() -> Self {
        Self {
            memory_kib: 64 * 1024,
            passes: 2,
            lanes: 1,
        }
    }

    /// Cheap parameters for tests and local development only.
    pub const fn insecure_fast() -> Self {
        Self {
            memory_kib: 8 * 1024,
            passes: 1,
            lanes: 1,
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

/// Generate a fresh random salt for one handshake attempt.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive the pre-shared key from a password and salt using Argon2id.
///
/// The salt must be exactly [`SALT_SIZE`] bytes.
pub fn derive_psk(
    password: &SecretString,
    salt: &[u8],
    params: &KdfParams,
) -> CryptoResult<PresharedKey> {
    if salt.len() != SALT_SIZE {
        return Err(CryptoError::InvalidLength {
            what: "salt",
            expected: SALT_SIZE,
            actual: salt.len(),
        });
    }

    let argon2_params = Params::new(params.memory_kib, params.passes, params.lanes, Some(KEY_SIZE))
        .map_err(|e| CryptoError::KeyDerivation(format!("invalid Argon2id params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(password.expose_secret().as_bytes(), salt, &mut key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let psk = PresharedKey::from_bytes(key);
    key.zeroize();
    Ok(psk)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> KdfParams {
        KdfParams {
            memory_kib: 1024,
            passes: 1,
            lanes: 1,
        }
    }

    #[test]
    fn test_kdf_deterministic() {
        let password = SecretString::from("correct-horse");
        let salt = [7u8; SALT_SIZE];

        let a = derive_psk(&password, &salt, &fast_params()).unwrap();
        let b = derive_psk(&password, &salt, &fast_params()).unwrap();

        assert_eq!(a.as_bytes(), b.as_bytes(), "KDF must be deterministic");
    }

    #[test]
    fn test_kdf_different_passwords() {
        let salt = [7u8; SALT_SIZE];

        let a = derive_psk(&SecretString::from("correct-horse"), &salt, &fast_params()).unwrap();
        let b = derive_psk(&SecretString::from("battery-staple"), &salt, &fast_params()).unwrap();

        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_kdf_different_salts() {
        let password = SecretString::from("correct-horse");

        let a = derive_psk(&password, &[1u8; SALT_SIZE], &fast_params()).unwrap();
        let b = derive_psk(&password, &[2u8; SALT_SIZE], &fast_params()).unwrap();

        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_kdf_rejects_bad_salt_length() {
        let password = SecretString::from("correct-horse");
        let result = derive_psk(&password, &[0u8; 8], &fast_params());

        assert!(matches!(
            result,
            Err(CryptoError::InvalidLength {
                what: "salt",
                expected: SALT_SIZE,
                actual: 8
            })
        ));
    }

    #[test]
    fn test_salts_are_fresh() {
        assert_ne!(generate_salt(), generate_salt());
    }
}
