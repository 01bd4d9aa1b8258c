use reqwest::StatusCode;
use thiserror::Error;

/// Failures surfaced by the transport layer.
///
/// Most request helpers log and swallow these; only the streaming and
/// builder entry points hand them back to the caller.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("invalid proxy URL '{url}': {source}")]
    InvalidProxy {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
