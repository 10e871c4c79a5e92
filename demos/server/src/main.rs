//! Execution streaming server.
//!
//! Run with: cargo run -p execstream-server
//!
//! Then:
//! ```text
//! curl -X POST localhost:7234/executions \
//!   -d '{"metadata":{"name":"demo"},"spec":{"session_id":"ses-1"}}'
//! curl -N localhost:7234/executions/<id>/stream
//! curl -X POST localhost:7234/executions/<id>/status -d '{"phase":"completed"}'
//! ```

mod config;

use std::sync::Arc;

use anyhow::Context;
use execstream_controller::ExecutionController;
use execstream_core::StreamBroker;
use execstream_store::MemoryStore;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("loading configuration")?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .init();

    // No workflow engine is wired in; created executions stay pending until
    // something posts a status update.
    let controller = Arc::new(ExecutionController::new(
        Arc::new(MemoryStore::new()),
        Arc::new(StreamBroker::new()),
        None,
    ));

    let shutdown = CancellationToken::new();
    let app = execstream_transport::router_with_shutdown(controller, shutdown.clone())
        .layer(CorsLayer::permissive());

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(env = %config.env, "Server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("serving HTTP")?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C after closing every open event stream.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
