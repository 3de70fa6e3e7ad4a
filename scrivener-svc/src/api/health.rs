//! Health endpoint

use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: String,
    pub device: String,
    pub version: &'static str,
    pub uptime_seconds: i64,
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        model: state.transcriber.model().to_string(),
        device: state.transcriber.device().to_string(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
    })
}
