// Public API for the server binary and integration tests

pub mod api;
pub mod config;
pub mod driver;
pub mod engine;
pub mod llm;
pub mod protocol;
pub mod results;
pub mod state;
pub mod supply;
pub mod types;
pub mod ws;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// All HTTP and WebSocket routes
pub fn router(state: Arc<state::AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/leaderboards", get(api::leaderboards))
        .route("/api/health", get(api::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
