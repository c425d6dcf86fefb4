//! Transport error types

use crypto_session::{CryptoError, HandshakeError, HandshakeState};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// A frame failed to decrypt; the connection has been torn down.
    #[error("Decryption failed, connection closed")]
    Decryption,

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Framing error: {0}")]
    Framing(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether this failure most likely means the password was wrong.
    ///
    /// The responder closes without replying when it cannot open the
    /// ClientHello, so closure while awaiting ServerHello counts too.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::Handshake(HandshakeError::AuthenticationFailed)
                | Self::Handshake(HandshakeError::TransportClosed {
                    state: HandshakeState::AwaitingServerHello
                })
        )
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_failure_classification() {
        assert!(TransportError::from(HandshakeError::AuthenticationFailed).is_authentication_failure());
        assert!(
            TransportError::from(HandshakeError::TransportClosed {
                state: HandshakeState::AwaitingServerHello
            })
            .is_authentication_failure()
        );

        assert!(
            !TransportError::from(HandshakeError::TransportClosed {
                state: HandshakeState::AwaitingClientReady
            })
            .is_authentication_failure()
        );
        assert!(
            !TransportError::from(HandshakeError::TimedOut {
                state: HandshakeState::AwaitingServerHello
            })
            .is_authentication_failure()
        );
        assert!(!TransportError::ConnectionFailed("refused".into()).is_authentication_failure());
        assert!(!TransportError::Decryption.is_authentication_failure());
    }
}
