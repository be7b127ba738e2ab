//! Status HTTP server
//!
//! Exposes liveness, readiness and connector counters of a running bridge.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{Error, Result};
use crate::pipeline::Bridge;

/// Build the status router for a bridge
pub fn router(bridge: Arc<Bridge>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ping", get(ping))
        .route("/ready", get(ready))
        .route("/stats", get(stats))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(bridge)
}

/// Serve the status endpoints on `listener` until `shutdown` fires
pub async fn serve(
    listener: TcpListener,
    bridge: Arc<Bridge>,
    shutdown: CancellationToken,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Starting HTTP server on http://{}", addr);
    }

    axum::serve(listener, router(bridge))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| Error::config(format!("Server error: {e}")))?;

    Ok(())
}

async fn ping() -> &'static str {
    "pong"
}

async fn ready(State(bridge): State<Arc<Bridge>>) -> impl IntoResponse {
    let body = Json(json!({
        "input": bridge.input_state(),
        "output": bridge.output_state(),
    }));
    if bridge.is_ready() {
        (StatusCode::OK, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, body)
    }
}

async fn stats(State(bridge): State<Arc<Bridge>>) -> impl IntoResponse {
    Json(json!({ "connectors": bridge.metrics() }))
}
