//! Read-only HTTP query service over the rolling history.
//!
//! This module provides an HTTP server that:
//! - Reports liveness and pipeline counters via GET /health
//! - Serves the latest and averaged temperature per location as plain text
//! - Lists every known location via GET /temp
//!
//! Plain-text endpoints answer `NONE` when a location is unknown or has no
//! usable data, so shell scripts can consume them without a JSON parser.
//!
//! # Architecture
//!
//! ```text
//! Dispatcher ──→ HistoryRegistry ←── GET /temp/{location}/current ←── client
//!                                └── GET /temp/{location}/average
//! ```

use crate::core::SharedHistory;
use crate::stats::{SharedStats, StatsSnapshot};
use crate::{BANNER, VERSION};
use axum::{
    extract::{Path, State},
    http::Method,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

/// Body of the plain-text endpoints when there is nothing to report.
pub const NO_VALUE: &str = "NONE";

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind to
    pub host: String,
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// Shared server state
pub struct ServerState {
    history: SharedHistory,
    stats: SharedStats,
    /// Random per-process id, reported on /health
    instance_id: String,
    host: String,
}

impl ServerState {
    pub fn new(history: SharedHistory, stats: SharedStats) -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            history,
            stats,
            instance_id: Uuid::new_v4().to_string(),
            host,
        }
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub instance_id: String,
    pub host: String,
    pub locations: Vec<String>,
    pub stats: StatsSnapshot,
}

/// One entry of GET /temp
#[derive(Debug, Serialize)]
pub struct LocationReading {
    pub location: String,
    pub current: Option<f64>,
}

/// Render a temperature the way the text endpoints always have: `70.0`, not `70`.
fn render(value: f64) -> String {
    format!("{value:?}")
}

/// GET /
async fn index() -> &'static str {
    BANNER
}

/// GET /health
async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: VERSION.to_string(),
        instance_id: state.instance_id.clone(),
        host: state.host.clone(),
        locations: state.history.locations(),
        stats: state.stats.snapshot(),
    })
}

/// GET /temp/{location}/current
async fn current(State(state): State<Arc<ServerState>>, Path(alias): Path<String>) -> String {
    match state.history.get(&alias).map(|h| h.current()) {
        Some(Ok(value)) => render(value),
        _ => NO_VALUE.to_string(),
    }
}

/// GET /temp/{location}/average
async fn average(State(state): State<Arc<ServerState>>, Path(alias): Path<String>) -> String {
    match state.history.get(&alias).map(|h| h.average()) {
        Some(Ok(value)) => render(value),
        _ => NO_VALUE.to_string(),
    }
}

/// GET /temp
async fn list(State(state): State<Arc<ServerState>>) -> Json<Vec<LocationReading>> {
    let readings = state
        .history
        .locations()
        .into_iter()
        .map(|location| {
            let current = state
                .history
                .get(&location)
                .and_then(|h| h.current().ok());
            LocationReading { location, current }
        })
        .collect();
    Json(readings)
}

/// Build the router without binding it.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/temp", get(list))
        .route("/temp/:alias/current", get(current))
        .route("/temp/:alias/average", get(average))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET])
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    history: SharedHistory,
    stats: SharedStats,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(ServerState::new(history, stats));
    let app = router(state);

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Starting webservice on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Webservice shutdown signal received");
            })
            .await
        {
            tracing::error!("Webservice error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_keeps_decimal_point() {
        assert_eq!(render(70.0), "70.0");
        assert_eq!(render(70.25), "70.25");
    }
}
