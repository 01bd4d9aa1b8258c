//! Outbound HTTP for gptrelay.
//!
//! `HttpTransport` is the one client every channel adapter talks through:
//! JSON and raw requests, streamed replies, and multipart uploads.

pub mod client;
pub mod error;
pub mod multipart;

pub use client::{dedicated, shared, shared_proxy, ByteStream, HttpTransport, TlsPolicy, TransportBuilder};
pub use error::TransportError;
pub use multipart::filename_from_content_disposition;
