//! Core types, errors, and configuration for gptrelay.
//!
//! - [`types`]: canonical request/answer shapes and the per-call context
//! - [`error::GatewayError`]: boundary error taxonomy
//! - [`config`]: JSON config schema, loader, env overrides

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

pub use error::GatewayError;
pub use types::{
    CallContext, CanonicalAnswer, ChatMessage, ChatRole, ProxyRequest, ASSISTANT_ACK,
    DONE_SENTINEL,
};
