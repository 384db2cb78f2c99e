//! Optional HTTP health endpoint.

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Router};
use serde_json::json;

use crate::state::RelayState;

/// Router serving `GET /health` (and `GET /metrics` with the `metrics` feature).
pub fn router(state: Arc<RelayState>) -> Router {
    let app = Router::new().route("/health", get(health_handler));

    #[cfg(feature = "metrics")]
    let app = app.route("/metrics", get(metrics_handler));

    app.with_state(state)
}

async fn health_handler(State(state): State<Arc<RelayState>>) -> impl IntoResponse {
    let version = env!("CARGO_PKG_VERSION");
    let connections = state.connection_count().await;

    axum::Json(json!({
        "status": "ok",
        "version": version,
        "connections": connections,
    }))
}

#[cfg(feature = "metrics")]
async fn metrics_handler() -> impl IntoResponse {
    crate::metrics::render().unwrap_or_default()
}
