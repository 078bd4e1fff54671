//! REST and SSE API over the fusion engine

pub mod error;
pub mod handlers;
pub mod sse;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::fusion::FusionEngine;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<FusionEngine>,
    /// Server port
    pub port: u16,
    /// SSE keep-alive period
    pub keep_alive: Duration,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check (no prefix for health endpoint)
        .route("/health", get(health_check))
        .nest(
            "/api/v1",
            Router::new()
                .route("/observations", post(handlers::submit_observation))
                .route("/rooms/reset", post(handlers::reset_all))
                .route("/rooms/:room/fuse", post(handlers::fuse))
                .route("/rooms/:room/latest/:channel", get(handlers::latest_observation))
                .route("/rooms/:room/history", get(handlers::history))
                .route("/rooms/:room/reset", post(handlers::reset_room))
                .route("/stats", get(handlers::stats))
                .route(
                    "/config",
                    get(handlers::get_config).post(handlers::update_config),
                )
                .route(
                    "/temporal-config",
                    get(handlers::get_temporal_config).post(handlers::update_temporal_config),
                )
                .route("/events", get(sse::event_stream)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "emofuse",
        "version": env!("CARGO_PKG_VERSION"),
        "port": state.port,
    }))
}
