//! HTTP front end for gptrelay.
//!
//! [`create_router`] wires the interceptor, the chat-completions
//! controller and a health probe; [`serve`] runs it until shutdown.

pub mod error;
pub mod handlers;
pub mod interceptor;
pub mod state;

use std::future::Future;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::{Envelope, HttpError, SYSTEM_ERROR};
pub use state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/health", get(handlers::health))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            interceptor::intercept,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on `listener` until `shutdown` resolves; in-flight requests are
/// allowed to finish.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, channels = ?state.registry.channel_names(), "gptrelay listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("gptrelay shut down");
    Ok(())
}
