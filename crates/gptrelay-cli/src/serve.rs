//! `gptrelay serve`: run the gateway until Ctrl+C.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

use gptrelay_channels::ChannelRegistry;
use gptrelay_core::config::load_config;
use gptrelay_server::AppState;

pub async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path.as_deref());

    let registry =
        ChannelRegistry::from_config(&config).context("failed to register channels")?;
    if registry.is_empty() {
        warn!("No channels enabled; every chat request will be rejected");
    }
    if config.auth.secret.is_empty() {
        warn!("auth.secret is empty; any Authorization header is accepted");
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    let state = AppState::new(&config, registry);
    gptrelay_server::serve(listener, state, shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down..."),
        Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C"),
    }
}
