//! Password-authenticated three-message handshake
//!
//! Key transport (ClientHello/ServerHello, sealed under the password-derived
//! key) is separated from key confirmation (ClientReady, a MAC under a fresh
//! single-use key). Each step consumes the previous state, so a completed or
//! failed step can never be driven again; retries start from scratch with
//! fresh randomness.

use secrecy::SecretString;
use tracing::debug;
use zeroize::Zeroizing;

use crate::{
    AuthKey, BoxNonce, ClientHello, ClientReady, DecryptStream, EncryptStream, HandshakeError,
    HandshakeResult, KEY_SIZE, KdfParams, PresharedKey, ServerHello, StreamKey, authenticate,
    derive_psk, generate_salt, open, seal, verify,
};

/// Handshake role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Holds the user-entered password and speaks first
    Initiator,
    /// Holds the configured password and answers
    Responder,
}

/// Handshake progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    AwaitingClientHello,
    AwaitingServerHello,
    AwaitingClientReady,
    Established,
    Failed,
}

impl std::fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::AwaitingClientHello => "awaiting ClientHello",
            Self::AwaitingServerHello => "awaiting ServerHello",
            Self::AwaitingClientReady => "awaiting ClientReady",
            Self::Established => "established",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The two live stream halves of an established session
pub struct SessionStreams {
    /// Our outgoing stream
    pub send: EncryptStream,
    /// The peer's incoming stream
    pub recv: DecryptStream,
}

fn open_box(sealed: &[u8], nonce: &BoxNonce, psk: &PresharedKey) -> HandshakeResult<Zeroizing<Vec<u8>>> {
    open(sealed, nonce, psk).map_err(|_| HandshakeError::AuthenticationFailed)
}

fn key_from(bytes: &[u8]) -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&bytes[..KEY_SIZE]);
    key
}

/// Initiator side, waiting for ServerHello.
pub struct ClientHandshake {
    psk: PresharedKey,
    pull_seed: StreamKey,
}

impl ClientHandshake {
    /// Build the ClientHello with fresh salt, nonce and pull seed key.
    pub fn start(password: &SecretString, params: &KdfParams) -> HandshakeResult<(Self, ClientHello)> {
        let salt = generate_salt();
        let box_nonce = BoxNonce::generate();
        let pull_seed = StreamKey::generate();

        let psk = derive_psk(password, &salt, params)
            .map_err(|e| HandshakeError::KeyDerivation(e.to_string()))?;
        let sealed = seal(pull_seed.as_bytes(), &box_nonce, &psk)?;

        let mut sealed_pull_seed = [0u8; crate::SEALED_PULL_SEED_SIZE];
        sealed_pull_seed.copy_from_slice(&sealed);

        debug!("ClientHello prepared");
        Ok((
            Self { psk, pull_seed },
            ClientHello {
                salt,
                box_nonce,
                sealed_pull_seed,
            },
        ))
    }

    pub fn state(&self) -> HandshakeState {
        HandshakeState::AwaitingServerHello
    }

    /// Process ServerHello, open both streams and build ClientReady.
    pub fn finish(self, server_hello: &[u8]) -> HandshakeResult<(SessionStreams, ClientReady)> {
        let hello = ServerHello::from_bytes(server_hello)?;

        let keys = open_box(&hello.sealed_push_auth, &hello.box_nonce, &self.psk)?;
        let push_seed = StreamKey::from_bytes(key_from(&keys[..KEY_SIZE]));
        let auth_key = AuthKey::from_bytes(key_from(&keys[KEY_SIZE..]));

        let recv = DecryptStream::new(&hello.pull_header, &self.pull_seed)?;
        let (send, push_header) = EncryptStream::new(&push_seed)?;
        let mac = authenticate(push_header.as_bytes(), &auth_key)?;

        debug!("ServerHello accepted, sending ClientReady");
        Ok((SessionStreams { send, recv }, ClientReady { push_header, mac }))
    }
}

/// Responder side, waiting for ClientReady.
pub struct ServerHandshake {
    send: EncryptStream,
    push_seed: StreamKey,
    auth_key: AuthKey,
}

impl ServerHandshake {
    /// Process ClientHello and build ServerHello.
    ///
    /// On [`HandshakeError::AuthenticationFailed`] the caller must close the
    /// connection without replying.
    pub fn respond(
        password: &SecretString,
        params: &KdfParams,
        client_hello: &[u8],
    ) -> HandshakeResult<(Self, ServerHello)> {
        let hello = ClientHello::from_bytes(client_hello)?;

        let psk = derive_psk(password, &hello.salt, params)
            .map_err(|e| HandshakeError::KeyDerivation(e.to_string()))?;
        let pull_seed = open_box(&hello.sealed_pull_seed, &hello.box_nonce, &psk)?;
        let pull_seed = StreamKey::from_bytes(key_from(&pull_seed));

        let push_seed = StreamKey::generate();
        let auth_key = AuthKey::generate();
        let (send, pull_header) = EncryptStream::new(&pull_seed)?;

        let mut keys = Zeroizing::new([0u8; KEY_SIZE * 2]);
        keys[..KEY_SIZE].copy_from_slice(push_seed.as_bytes());
        keys[KEY_SIZE..].copy_from_slice(auth_key.as_bytes());

        let box_nonce = BoxNonce::generate();
        let sealed = seal(&keys[..], &box_nonce, &psk)?;
        let mut sealed_push_auth = [0u8; crate::SEALED_PUSH_AUTH_SIZE];
        sealed_push_auth.copy_from_slice(&sealed);

        debug!("ClientHello accepted, sending ServerHello");
        Ok((
            Self {
                send,
                push_seed,
                auth_key,
            },
            ServerHello {
                box_nonce,
                sealed_push_auth,
                pull_header,
            },
        ))
    }

    pub fn state(&self) -> HandshakeState {
        HandshakeState::AwaitingClientReady
    }

    /// Verify ClientReady and open the initiator's stream.
    pub fn finish(self, client_ready: &[u8]) -> HandshakeResult<SessionStreams> {
        let ready = ClientReady::from_bytes(client_ready)?;

        verify(&ready.mac, ready.push_header.as_bytes(), &self.auth_key)
            .map_err(|_| HandshakeError::AuthenticationFailed)?;
        let recv = DecryptStream::new(&ready.push_header, &self.push_seed)?;

        debug!("ClientReady verified, session established");
        Ok(SessionStreams {
            send: self.send,
            recv,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CLIENT_HELLO_SIZE, CLIENT_READY_SIZE, SERVER_HELLO_SIZE};

    fn fast_params() -> KdfParams {
        KdfParams {
            memory_kib: 1024,
            passes: 1,
            lanes: 1,
        }
    }

    fn password(s: &str) -> SecretString {
        SecretString::from(s)
    }

    #[test]
    fn test_handshake_and_encryption() {
        let params = fast_params();
        let (client, hello) = ClientHandshake::start(&password("correct-horse"), &params).unwrap();
        assert_eq!(hello.to_bytes().len(), CLIENT_HELLO_SIZE);

        let (server, server_hello) =
            ServerHandshake::respond(&password("correct-horse"), &params, &hello.to_bytes()).unwrap();
        assert_eq!(server_hello.to_bytes().len(), SERVER_HELLO_SIZE);

        let (mut client_streams, ready) = client.finish(&server_hello.to_bytes()).unwrap();
        assert_eq!(ready.to_bytes().len(), CLIENT_READY_SIZE);

        let mut server_streams = server.finish(&ready.to_bytes()).unwrap();

        // Test initiator -> responder
        let message = b"Hello from initiator!";
        let encrypted = client_streams.send.encrypt(message).unwrap();
        let decrypted = server_streams.recv.decrypt(&encrypted).unwrap();
        assert_eq!(message.as_slice(), decrypted.as_slice());

        // Test responder -> initiator
        let response = b"Hello from responder!";
        let encrypted = server_streams.send.encrypt(response).unwrap();
        let decrypted = client_streams.recv.decrypt(&encrypted).unwrap();
        assert_eq!(response.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_wrong_password_fails_at_server_hello() {
        let params = fast_params();
        let (_client, hello) = ClientHandshake::start(&password("correct-horse"), &params).unwrap();

        let result = ServerHandshake::respond(&password("wrong-horse"), &params, &hello.to_bytes());
        assert!(matches!(result, Err(HandshakeError::AuthenticationFailed)));
    }

    #[test]
    fn test_states() {
        let params = fast_params();
        let (client, hello) = ClientHandshake::start(&password("pw"), &params).unwrap();
        assert_eq!(client.state(), HandshakeState::AwaitingServerHello);

        let (server, _) = ServerHandshake::respond(&password("pw"), &params, &hello.to_bytes()).unwrap();
        assert_eq!(server.state(), HandshakeState::AwaitingClientReady);
    }

    #[test]
    fn test_fresh_randomness_per_attempt() {
        let params = fast_params();
        let (_, a) = ClientHandshake::start(&password("pw"), &params).unwrap();
        let (_, b) = ClientHandshake::start(&password("pw"), &params).unwrap();

        assert_ne!(a.salt, b.salt);
        assert_ne!(a.box_nonce, b.box_nonce);
        assert_ne!(a.sealed_pull_seed, b.sealed_pull_seed);
    }
}
