//! Handshake wire messages
//!
//! Plain concatenations of fixed-size fields; there are no length prefixes,
//! so every message has exactly one valid size.

use crate::{
    BOX_NONCE_SIZE, BoxNonce, HandshakeError, HandshakeResult, KEY_SIZE, MAC_SIZE, SALT_SIZE,
    STREAM_HEADER_SIZE, StreamHeader, sealed_len,
};

/// Sealed PullSeedKey
pub const SEALED_PULL_SEED_SIZE: usize = sealed_len(KEY_SIZE);

/// Sealed PushSeedKey ‖ AuthKey
pub const SEALED_PUSH_AUTH_SIZE: usize = sealed_len(KEY_SIZE * 2);

/// Salt ‖ BoxNonce ‖ SealedPullSeed
pub const CLIENT_HELLO_SIZE: usize = SALT_SIZE + BOX_NONCE_SIZE + SEALED_PULL_SEED_SIZE;

/// BoxNonce2 ‖ SealedPushAuth ‖ PullHeader
pub const SERVER_HELLO_SIZE: usize = BOX_NONCE_SIZE + SEALED_PUSH_AUTH_SIZE + STREAM_HEADER_SIZE;

/// PushHeader ‖ Mac
pub const CLIENT_READY_SIZE: usize = STREAM_HEADER_SIZE + MAC_SIZE;

fn check_len(message: &'static str, expected: usize, data: &[u8]) -> HandshakeResult<()> {
    if data.len() != expected {
        return Err(HandshakeError::MalformedMessage {
            message,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Split `N` bytes off the front of `data`.
///
/// Callers check the total length first, so the split always succeeds.
fn take<const N: usize>(data: &mut &[u8]) -> [u8; N] {
    let (head, rest) = data.split_at(N);
    let mut out = [0u8; N];
    out.copy_from_slice(head);
    *data = rest;
    out
}

/// Initiator → responder, first message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub salt: [u8; SALT_SIZE],
    pub box_nonce: BoxNonce,
    pub sealed_pull_seed: [u8; SEALED_PULL_SEED_SIZE],
}

impl ClientHello {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CLIENT_HELLO_SIZE);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(self.box_nonce.as_bytes());
        out.extend_from_slice(&self.sealed_pull_seed);
        out
    }

    pub fn from_bytes(data: &[u8]) -> HandshakeResult<Self> {
        check_len("ClientHello", CLIENT_HELLO_SIZE, data)?;
        let mut rest = data;
        Ok(Self {
            salt: take(&mut rest),
            box_nonce: BoxNonce(take(&mut rest)),
            sealed_pull_seed: take(&mut rest),
        })
    }
}

/// Responder → initiator, second message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub box_nonce: BoxNonce,
    pub sealed_push_auth: [u8; SEALED_PUSH_AUTH_SIZE],
    pub pull_header: StreamHeader,
}

impl ServerHello {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SERVER_HELLO_SIZE);
        out.extend_from_slice(self.box_nonce.as_bytes());
        out.extend_from_slice(&self.sealed_push_auth);
        out.extend_from_slice(self.pull_header.as_bytes());
        out
    }

    pub fn from_bytes(data: &[u8]) -> HandshakeResult<Self> {
        check_len("ServerHello", SERVER_HELLO_SIZE, data)?;
        let mut rest = data;
        Ok(Self {
            box_nonce: BoxNonce(take(&mut rest)),
            sealed_push_auth: take(&mut rest),
            pull_header: StreamHeader(take(&mut rest)),
        })
    }
}

/// Initiator → responder, final message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientReady {
    pub push_header: StreamHeader,
    pub mac: [u8; MAC_SIZE],
}

impl ClientReady {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CLIENT_READY_SIZE);
        out.extend_from_slice(self.push_header.as_bytes());
        out.extend_from_slice(&self.mac);
        out
    }

    pub fn from_bytes(data: &[u8]) -> HandshakeResult<Self> {
        check_len("ClientReady", CLIENT_READY_SIZE, data)?;
        let mut rest = data;
        Ok(Self {
            push_header: StreamHeader(take(&mut rest)),
            mac: take(&mut rest),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_sizes() {
        assert_eq!(CLIENT_HELLO_SIZE, 88);
        assert_eq!(SERVER_HELLO_SIZE, 128);
        assert_eq!(CLIENT_READY_SIZE, 56);
    }

    #[test]
    fn test_client_hello_layout() {
        let hello = ClientHello {
            salt: [1u8; SALT_SIZE],
            box_nonce: BoxNonce([2u8; BOX_NONCE_SIZE]),
            sealed_pull_seed: [3u8; SEALED_PULL_SEED_SIZE],
        };
        let bytes = hello.to_bytes();

        assert_eq!(bytes.len(), CLIENT_HELLO_SIZE);
        assert!(bytes[..SALT_SIZE].iter().all(|b| *b == 1));
        assert!(bytes[SALT_SIZE..SALT_SIZE + BOX_NONCE_SIZE].iter().all(|b| *b == 2));
        assert!(bytes[SALT_SIZE + BOX_NONCE_SIZE..].iter().all(|b| *b == 3));
        assert_eq!(ClientHello::from_bytes(&bytes).unwrap(), hello);
    }

    #[test]
    fn test_server_hello_header_is_last() {
        let hello = ServerHello {
            box_nonce: BoxNonce([4u8; BOX_NONCE_SIZE]),
            sealed_push_auth: [5u8; SEALED_PUSH_AUTH_SIZE],
            pull_header: StreamHeader([6u8; STREAM_HEADER_SIZE]),
        };
        let bytes = hello.to_bytes();

        assert!(bytes[SERVER_HELLO_SIZE - STREAM_HEADER_SIZE..].iter().all(|b| *b == 6));
        assert_eq!(ServerHello::from_bytes(&bytes).unwrap(), hello);
    }

    #[test]
    fn test_wrong_lengths_rejected() {
        assert!(matches!(
            ClientHello::from_bytes(&[0u8; CLIENT_HELLO_SIZE - 1]),
            Err(HandshakeError::MalformedMessage {
                message: "ClientHello",
                ..
            })
        ));
        assert!(ServerHello::from_bytes(&[0u8; SERVER_HELLO_SIZE + 1]).is_err());
        assert!(ClientReady::from_bytes(&[]).is_err());
    }
}
