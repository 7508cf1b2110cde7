//! API layer - routes, handlers, and middleware

pub mod extractors;
pub mod handlers;
pub mod headers;
pub mod middleware;
pub mod paging;
pub mod routes;
pub mod url;

use crate::state::AppState;
use axum::{extract::DefaultBodyLimit, routing::get, Router};

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let max_body_size = state.config.server.max_request_body_size;
    let cors_origins = state.config.server.cors_origins.clone();
    let request_timeout = state.config.server.request_timeout_seconds;

    Router::new()
        .route("/health", get(handlers::health_check))
        .merge(routes::metrics::metrics_routes())
        .nest("/fhir", routes::fhir::fhir_routes())
        .with_state(state)
        // Applied in reverse order: the request span wraps everything below it
        .layer(middleware::timeout(request_timeout))
        .layer(axum::middleware::from_fn(middleware::metrics_middleware))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(middleware::compression())
        .layer(middleware::cors(&cors_origins))
        .layer(DefaultBodyLimit::max(max_body_size))
}
