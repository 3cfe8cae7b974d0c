//! Terramask Service Library
//!
//! HTTP handlers and router for the terrain service.
//! This library is used by both the terramask-service binary and integration tests.

pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use terramask::TerrainEngine;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Application state shared across handlers.
pub struct AppState {
    /// Engine answering elevation and mask queries.
    pub engine: TerrainEngine,
}

/// Build the service router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/elevation", get(handlers::get_elevation))
        .route("/grid", get(handlers::get_grid))
        .route("/mask", get(handlers::get_mask))
        .route("/visibility", get(handlers::get_visibility))
        .route("/reload", post(handlers::reload))
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::get_stats))
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}

// Re-export commonly used types for convenience
pub use handlers::{
    ElevationQuery, ElevationResponse, ErrorResponse, GridQuery, GridResponse, HealthResponse,
    MaskQuery, MaskResponse, ReloadResponse, StatsResponse, VisibilityQuery, VisibilityResponse,
};
