//! Crypto Session - Password-authenticated channels for Streaming Remote
//!
//! Provides the three-message handshake that turns a shared password into two
//! independent one-way encrypted streams:
//!
//! ```text
//! ClientHello  initiator -> responder  Salt ‖ BoxNonce ‖ Seal(PullSeedKey)
//! ServerHello  responder -> initiator  BoxNonce2 ‖ Seal(PushSeedKey ‖ AuthKey) ‖ PullHeader
//! ClientReady  initiator -> responder  PushHeader ‖ HMAC(PushHeader, AuthKey)
//! ```
//!
//! Everything here is sans-IO; the async driver lives in `net-transport`.

mod error;
mod handshake;
mod kdf;
mod mac;
mod messages;
mod secret_box;
mod stream;

pub use error::*;
pub use handshake::*;
pub use kdf::*;
pub use mac::*;
pub use messages::*;
pub use secret_box::*;
pub use stream::*;

/// Size of every symmetric key (256 bits / 32 bytes)
pub const KEY_SIZE: usize = 32;

/// Password hashing salt size (128 bits / 16 bytes)
pub const SALT_SIZE: usize = 16;

/// XChaCha20-Poly1305 nonce size used by the secret box (192 bits / 24 bytes)
pub const BOX_NONCE_SIZE: usize = 24;

/// Authentication tag size for both the secret box and stream frames (128 bits / 16 bytes)
pub const TAG_SIZE: usize = 16;

/// Public stream header size (192 bits / 24 bytes)
pub const STREAM_HEADER_SIZE: usize = 24;

/// Key confirmation MAC size (256 bits / 32 bytes)
pub const MAC_SIZE: usize = 32;
