//! Read-only introspection endpoints.
//!
//! | Route | Body |
//! |---|---|
//! | `GET /health` | `{"status":"healthy","uptime":"1h 2m 3s"}` |
//! | `GET /ready` | `{"status":"ready"\|"no_connections","connections":N}` |
//! | `GET /stats` | [`PublisherStats`](crate::publisher::PublisherStats) |
//! | `GET /connections` | `{"count":N,"connections":[ConnectionInfo]}` |
//! | `GET <metrics.path>` | Prometheus text format |
//! | `GET /debug/vars` | stats plus tokio runtime counters |
//!
//! Nothing here mutates hub state.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{PublisherError, Result};
use crate::metrics;
use crate::publisher::Publisher;

#[derive(Clone)]
struct HttpState {
    publisher: Arc<Publisher>,
    started: Instant,
}

/// Build the introspection router.
pub fn router(publisher: Arc<Publisher>, metrics_path: &str) -> Router {
    let state = HttpState {
        publisher,
        started: Instant::now(),
    };

    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/stats", get(stats))
        .route("/connections", get(connections))
        .route("/debug/vars", get(debug_vars))
        .route(metrics_path, get(prometheus_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve `router` until `shutdown` fires.
pub async fn serve(addr: SocketAddr, router: Router, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| PublisherError::Bind { addr, source })?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn health(State(state): State<HttpState>) -> Json<Value> {
    let uptime = Duration::from_secs(state.started.elapsed().as_secs());
    Json(json!({
        "status": "healthy",
        "uptime": humantime::format_duration(uptime).to_string(),
    }))
}

async fn ready(State(state): State<HttpState>) -> Json<Value> {
    let connections = state.publisher.server().connection_count();
    let status = if connections == 0 {
        "no_connections"
    } else {
        "ready"
    };
    Json(json!({ "status": status, "connections": connections }))
}

async fn stats(State(state): State<HttpState>) -> impl IntoResponse {
    Json(state.publisher.stats())
}

async fn connections(State(state): State<HttpState>) -> Json<Value> {
    let connections = state.publisher.server().connections();
    Json(json!({ "count": connections.len(), "connections": connections }))
}

async fn debug_vars(State(state): State<HttpState>) -> Json<Value> {
    let runtime = tokio::runtime::Handle::current().metrics();
    Json(json!({
        "publisher": state.publisher.stats(),
        "runtime": {
            "workers": runtime.num_workers(),
            "alive_tasks": runtime.num_alive_tasks(),
            "hub_tasks": state.publisher.server().task_count(),
        },
    }))
}

async fn prometheus_metrics() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, metrics::content_type())], metrics::gather())
}
