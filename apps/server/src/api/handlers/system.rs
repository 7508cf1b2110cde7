//! Health and metrics endpoints

use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;

/// Liveness only; does not touch the database.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "ehr-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Prometheus text format metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let idle = state.db_pool.num_idle();
    let size = state.db_pool.size() as usize;
    crate::metrics::DB_CONNECTIONS_IDLE.set(idle as i64);
    crate::metrics::DB_CONNECTIONS_ACTIVE.set(size.saturating_sub(idle) as i64);

    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    match encoder.encode(&prometheus::gather(), &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("Content-Type", "text/plain")],
                b"Failed to encode metrics".to_vec(),
            )
        }
    }
}
