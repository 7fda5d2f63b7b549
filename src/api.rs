//! HTTP API endpoints.
//!
//! Read-only: leaderboards derived from the score log, and a health check.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_sessions: usize,
    pub supplier: String,
}

/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_sessions: state.active_sessions(),
        supplier: state.supplier.name().to_string(),
    })
}

/// Leaderboards from the score log.
///
/// GET /api/leaderboards
pub async fn leaderboards(State(state): State<Arc<AppState>>) -> Response {
    match state.scores.leaderboards().await {
        Ok(boards) => Json(boards).into_response(),
        Err(e) => {
            tracing::error!("Failed to read score log: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Score log unavailable: {}", e),
            )
                .into_response()
        }
    }
}
