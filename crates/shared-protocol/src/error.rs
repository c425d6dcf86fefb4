//! Error types for the protocol

use thiserror::Error;

/// Protocol error
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported JSON-RPC version: {0}")]
    InvalidVersion(String),

    #[error("Invalid message shape: {0}")]
    InvalidShape(&'static str),

    #[error("Invalid message id: {0}")]
    InvalidId(String),
}

/// Result type alias for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
