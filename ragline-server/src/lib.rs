//! # ragline-server
//!
//! HTTP API over the [`ragline`] pipeline: retrieval-augmented chat plus
//! per-user document upload, listing, deletion and search.
//!
//! Every route except `/health` requires the caller's user id in the
//! `x-user-id` header, set by the authenticating gateway in front of this
//! service. All retrieval is scoped to that user.

pub mod auth;
pub mod config;
pub mod error;
pub mod rest;
pub mod state;

use std::net::SocketAddr;

use anyhow::Context;
use tracing::info;

pub use config::{ConfigError, ServerConfig};
pub use error::ApiError;
pub use rest::api_router;
pub use state::AppState;

/// Serve the API on `config.port` until `shutdown` resolves.
pub async fn run_server<F>(config: ServerConfig, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let state = AppState::from_config(&config)?;
    let app = api_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("ragline-server listening on http://{}", addr);
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;
    Ok(())
}
