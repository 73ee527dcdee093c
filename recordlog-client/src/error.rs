//! Client error types.

use recordlog_protocol::ErrorCode;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] recordlog_protocol::ProtocolError),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("response id mismatch: expected {expected}, got {got}")]
    UnexpectedResponse { expected: String, got: String },

    #[error("server error: {code} - {message}")]
    Server {
        code: ErrorCode,
        message: String,
        retryable: bool,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Io(_) => true,
            ClientError::ConnectionClosed => true,
            ClientError::Server { retryable, .. } => *retryable,
            _ => false,
        }
    }
}
