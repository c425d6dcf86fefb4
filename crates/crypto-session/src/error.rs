//! Crypto session error types

use thiserror::Error;

use crate::HandshakeState;

/// Cryptographic operation error
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: authentication tag mismatch")]
    DecryptionFailed,

    #[error("Stream is poisoned by an earlier decryption failure")]
    StreamPoisoned,

    #[error("Invalid {what} length: expected {expected}, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Nonce overflow: maximum message count exceeded")]
    NonceOverflow,
}

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Handshake failure. Every variant is terminal for the attempt.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The peer's box or MAC did not verify.
    ///
    /// A wrong password and a corrupted message produce this same variant.
    #[error("Handshake authentication failed (wrong password or corrupted message)")]
    AuthenticationFailed,

    #[error("Malformed {message}: expected {expected} bytes, got {actual}")]
    MalformedMessage {
        message: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Transport closed while {state}")]
    TransportClosed { state: HandshakeState },

    #[error("Handshake timed out while {state}")]
    TimedOut { state: HandshakeState },

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

pub type HandshakeResult<T> = Result<T, HandshakeError>;
