use thiserror::Error;

use gptrelay_transport::TransportError;

use crate::session::StreamMode;

/// Failure of a single fragment while a reply is in flight.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("upstream failure: {0}")]
    Upstream(#[from] TransportError),

    #[error("could not decode upstream payload: {0}")]
    Decode(String),
}

/// Registration problems, reported once at startup.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("channel '{channel}' has weight 0; weights must be at least 1")]
    ZeroWeight { channel: String },

    #[error("channel '{channel}' registered twice for {mode} mode")]
    DuplicateChannel { channel: String, mode: StreamMode },

    #[error("channel '{channel}' takes part in rotation but has no streaming variant")]
    MissingStreamingVariant { channel: String },

    #[error("'{0}' is reserved for rotation and cannot name a channel")]
    ReservedName(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
