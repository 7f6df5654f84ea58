//! HTTP surface: status JSON, project list, health and the notification
//! websocket.

pub mod api;
mod ws;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use api::{AppState, SharedState};

/// Configuration for the status server.
pub struct ServerConfig {
    pub port: u16,
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            dev_mode: false,
        }
    }
}

/// Build the full application router with API and websocket routes.
pub fn build_router(state: SharedState) -> Router {
    api::api_router()
        .route("/web_push", get(ws::ws_handler))
        .with_state(state)
}

/// Serve until Ctrl+C. `root` governs the hub and is cancelled on the way out.
pub async fn start_server(config: ServerConfig, state: AppState, root: CancellationToken) -> Result<()> {
    let mut app = build_router(Arc::new(state));

    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let host = if config.dev_mode { "0.0.0.0" } else { "127.0.0.1" };
    let addr = format!("{}:{}", host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "shipdeck listening");

    // Websocket connections only finish once the hub lets go of them.
    let hub_root = root.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            hub_root.cancel();
        })
        .await
        .context("Server error");

    root.cancel();
    tracing::info!("server shut down");
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
