//! # HTTP Server
//!
//! Serves `/metrics` for Prometheus scrapes and `/healthz` / `/readyz`
//! probes. The server marks itself ready once it has bound its listener.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::metrics;

/// Shared readiness state for the probe endpoints
#[derive(Debug)]
pub struct ServerState {
    /// Set once the listener is bound and the controller is serving
    pub is_ready: Arc<AtomicBool>,
}

/// Start the metrics and probe server, marking the state ready once bound
pub async fn start_server(port: u16, state: Arc<ServerState>) -> Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::clone(&state));

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context(format!("failed to bind {addr}"))?;
    info!("HTTP server listening on {addr}");
    state.is_ready.store(true, Ordering::Relaxed);

    axum::serve(listener, app).await.context("HTTP server failed")
}

async fn metrics_handler() -> Result<String, StatusCode> {
    metrics::gather().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn healthz_handler() -> StatusCode {
    StatusCode::OK
}

async fn readyz_handler(State(state): State<Arc<ServerState>>) -> StatusCode {
    if state.is_ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
