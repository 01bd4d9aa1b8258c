//! Gateway error taxonomy.
//!
//! Boundary failures (auth, validation, routing) are raised before any
//! backend is contacted. Upstream failures never appear here; sessions
//! absorb them and degrade the reply instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed body, missing header, empty conversation.
    #[error("{0}")]
    Validation(String),

    /// No credential supplied.
    #[error("{0}")]
    Unauthorized(String),

    /// Credential supplied but not accepted.
    #[error("{0}")]
    Forbidden(String),

    /// No session registered for the requested channel and mode.
    #[error("No channel registered for '{channel}' (stream={stream})")]
    ChannelNotFound { channel: String, stream: bool },

    /// Request body exceeded the configured cap.
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Anything else. The message is for logs only.
    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn validation(msg: impl Into<String>) -> Self {
        GatewayError::Validation(msg.into())
    }

    /// HTTP status code this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Validation(_) | GatewayError::ChannelNotFound { .. } => 400,
            GatewayError::Unauthorized(_) => 401,
            GatewayError::Forbidden(_) => 403,
            GatewayError::PayloadTooLarge { .. } => 413,
            GatewayError::Internal(_) => 500,
        }
    }
}
