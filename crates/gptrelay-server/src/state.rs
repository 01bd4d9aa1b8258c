use std::sync::Arc;

use gptrelay_channels::{ChannelRegistry, Normalizer};
use gptrelay_core::config::Config;

/// Shared, read-only state behind every request.
#[derive(Clone, Debug)]
pub struct AppState {
    pub registry: Arc<ChannelRegistry>,
    pub normalizer: Normalizer,
    /// Substring the `Authorization` header must contain, lowercased.
    pub secret: Arc<str>,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(config: &Config, registry: ChannelRegistry) -> Self {
        AppState {
            registry: Arc::new(registry),
            normalizer: Normalizer::new(config.log.print_answers),
            secret: Arc::from(config.auth.secret.to_lowercase()),
            max_body_bytes: config.server.max_body_bytes,
        }
    }
}
