//! Chained streaming AEAD, one instance per direction
//!
//! Each frame is ChaCha20-Poly1305 under a per-stream key derived from the
//! seed key and the public header. The nonce carries the frame counter and the
//! associated data carries the previous frame's tag, so a frame only opens at
//! its exact position in the sequence.

use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use hkdf::Hkdf;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{CryptoError, CryptoResult, KEY_SIZE, STREAM_HEADER_SIZE, TAG_SIZE};

const STREAM_INFO: &[u8] = b"streaming-remote stream v1";
const NONCE_SIZE: usize = 12;

/// Seed key for one direction of a session.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StreamKey {
    bytes: [u8; KEY_SIZE],
}

impl StreamKey {
    /// Generate a random stream seed key
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

impl std::fmt::Debug for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Public value the peer needs to open a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader(pub [u8; STREAM_HEADER_SIZE]);

impl StreamHeader {
    pub fn as_bytes(&self) -> &[u8; STREAM_HEADER_SIZE] {
        &self.0
    }
}

/// Chaining state shared by both halves
struct ChainState {
    cipher: ChaCha20Poly1305,
    /// Index of the next frame
    counter: u64,
    /// Tag of the previous frame, zeros before the first
    chain: [u8; TAG_SIZE],
}

impl ChainState {
    fn new(key: &StreamKey, header: &StreamHeader) -> CryptoResult<Self> {
        let hkdf = Hkdf::<Sha256>::new(Some(header.as_bytes()), key.as_bytes());
        let mut working_key = Zeroizing::new([0u8; KEY_SIZE]);
        hkdf.expand(STREAM_INFO, &mut working_key[..])
            .map_err(|e| CryptoError::KeyDerivation(format!("HKDF expand failed: {e}")))?;

        let cipher = ChaCha20Poly1305::new_from_slice(&working_key[..])
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

        Ok(Self {
            cipher,
            counter: 0,
            chain: [0u8; TAG_SIZE],
        })
    }

    /// Nonce format: [4 zero bytes][8 bytes counter]
    fn nonce(&self) -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[4..12].copy_from_slice(&self.counter.to_le_bytes());
        nonce
    }

    fn advance(&mut self, frame: &[u8]) {
        self.chain.copy_from_slice(&frame[frame.len() - TAG_SIZE..]);
        self.counter += 1;
    }
}

impl Drop for ChainState {
    fn drop(&mut self) {
        self.chain.zeroize();
    }
}

/// Encrypting half of a stream.
pub struct EncryptStream {
    state: ChainState,
}

impl EncryptStream {
    /// Create an encrypting stream with a fresh random header.
    ///
    /// The header must reach the peer before any frame is usable.
    pub fn new(key: &StreamKey) -> CryptoResult<(Self, StreamHeader)> {
        let mut header = [0u8; STREAM_HEADER_SIZE];
        OsRng.fill_bytes(&mut header);
        let header = StreamHeader(header);

        let state = ChainState::new(key, &header)?;
        Ok((Self { state }, header))
    }

    /// Encrypt one frame and advance the chain.
    ///
    /// Returns: [ciphertext][16-byte auth tag]
    pub fn encrypt(&mut self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        if self.state.counter == u64::MAX {
            return Err(CryptoError::NonceOverflow);
        }

        let nonce = self.state.nonce();
        let frame = self
            .state
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &self.state.chain,
                },
            )
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        self.state.advance(&frame);
        Ok(frame)
    }
}

/// Decrypting half of a stream.
///
/// The first failure poisons the stream; there is no resynchronization.
pub struct DecryptStream {
    state: ChainState,
    poisoned: bool,
}

impl DecryptStream {
    /// Open the peer's stream from its header and the shared seed key.
    pub fn new(header: &StreamHeader, key: &StreamKey) -> CryptoResult<Self> {
        Ok(Self {
            state: ChainState::new(key, header)?,
            poisoned: false,
        })
    }

    /// Verify and decrypt the next frame in sequence.
    pub fn decrypt(&mut self, frame: &[u8]) -> CryptoResult<Vec<u8>> {
        if self.poisoned {
            return Err(CryptoError::StreamPoisoned);
        }
        if self.state.counter == u64::MAX {
            self.poisoned = true;
            return Err(CryptoError::NonceOverflow);
        }
        if frame.len() < TAG_SIZE {
            self.poisoned = true;
            return Err(CryptoError::DecryptionFailed);
        }

        let nonce = self.state.nonce();
        let plaintext = self.state.cipher.decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: frame,
                aad: &self.state.chain,
            },
        );

        match plaintext {
            Ok(plaintext) => {
                self.state.advance(frame);
                Ok(plaintext)
            }
            Err(_) => {
                self.poisoned = true;
                Err(CryptoError::DecryptionFailed)
            }
        }
    }

    /// Number of frames accepted so far
    pub fn frames_received(&self) -> u64 {
        self.state.counter
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_pair() -> (EncryptStream, DecryptStream) {
        let key = StreamKey::generate();
        let (tx, header) = EncryptStream::new(&key).unwrap();
        let rx = DecryptStream::new(&header, &key).unwrap();
        (tx, rx)
    }

    #[test]
    fn test_in_order_frames() {
        let (mut tx, mut rx) = stream_pair();

        for i in 0..100 {
            let msg = format!("Message {}", i);
            let frame = tx.encrypt(msg.as_bytes()).unwrap();
            assert_eq!(frame.len(), msg.len() + TAG_SIZE);
            let plaintext = rx.decrypt(&frame).unwrap();
            assert_eq!(msg.as_bytes(), plaintext.as_slice());
        }

        assert_eq!(rx.frames_received(), 100);
    }

    #[test]
    fn test_empty_frame() {
        let (mut tx, mut rx) = stream_pair();
        let frame = tx.encrypt(b"").unwrap();
        assert!(rx.decrypt(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_reordered_frames_fail() {
        let (mut tx, mut rx) = stream_pair();
        let first = tx.encrypt(b"first").unwrap();
        let second = tx.encrypt(b"second").unwrap();

        assert!(matches!(rx.decrypt(&second), Err(CryptoError::DecryptionFailed)));
        assert!(matches!(rx.decrypt(&first), Err(CryptoError::StreamPoisoned)));
    }

    #[test]
    fn test_duplicate_frame_fails() {
        let (mut tx, mut rx) = stream_pair();
        let frame = tx.encrypt(b"once").unwrap();

        rx.decrypt(&frame).unwrap();
        assert!(rx.decrypt(&frame).is_err());
        assert!(rx.is_poisoned());
    }

    #[test]
    fn test_dropped_frame_fails() {
        let (mut tx, mut rx) = stream_pair();
        let _lost = tx.encrypt(b"lost").unwrap();
        let next = tx.encrypt(b"next").unwrap();

        assert!(rx.decrypt(&next).is_err());
    }

    #[test]
    fn test_truncated_frame_fails() {
        let (mut tx, mut rx) = stream_pair();
        let frame = tx.encrypt(b"truncate me").unwrap();

        assert!(rx.decrypt(&frame[..frame.len() - 1]).is_err());
    }

    #[test]
    fn test_wrong_header_fails() {
        let key = StreamKey::generate();
        let (mut tx, _header) = EncryptStream::new(&key).unwrap();
        let (_, other_header) = EncryptStream::new(&key).unwrap();
        let mut rx = DecryptStream::new(&other_header, &key).unwrap();

        let frame = tx.encrypt(b"hello").unwrap();
        assert!(rx.decrypt(&frame).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let (mut tx, header) = EncryptStream::new(&StreamKey::generate()).unwrap();
        let mut rx = DecryptStream::new(&header, &StreamKey::generate()).unwrap();

        let frame = tx.encrypt(b"hello").unwrap();
        assert!(rx.decrypt(&frame).is_err());
    }

    #[test]
    fn test_headers_are_fresh() {
        let key = StreamKey::generate();
        let (_, a) = EncryptStream::new(&key).unwrap();
        let (_, b) = EncryptStream::new(&key).unwrap();
        assert_ne!(a, b);
    }
}
