//! RPC error types

use net_transport::TransportError;
use shared_protocol::RpcErrorObject;
use thiserror::Error;

/// Failure of a single call, or of the whole session.
///
/// `Clone` so one session failure can be delivered to every pending call.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// The peer answered with an error response
    #[error("Remote error: {0}")]
    Remote(RpcErrorObject),

    #[error("Transport closed")]
    TransportClosed,

    #[error("Decryption failure, session closed")]
    DecryptionFailure,

    #[error("Call to {method} timed out")]
    Timeout { method: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid result for {method}: {reason}")]
    InvalidResult { method: String, reason: String },
}

impl From<TransportError> for RpcError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Decryption => Self::DecryptionFailure,
            TransportError::ConnectionClosed(_) => Self::TransportClosed,
            other => Self::Transport(other.to_string()),
        }
    }
}

pub type RpcResult<T> = Result<T, RpcError>;
