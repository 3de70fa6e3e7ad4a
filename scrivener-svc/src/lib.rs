//! Asynchronous audio transcription service
//!
//! Uploads are accepted over HTTP, persisted, and queued; a worker pool
//! runs the transcriber and stores results as transcripts. Clients poll
//! job status and fetch transcripts per user.

pub mod api;
pub mod audio;
pub mod blobs;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod models;
pub mod queue;
pub mod transcriber;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::blobs::BlobStore;
use crate::config::ServiceConfig;
use crate::queue::JobQueue;
use crate::transcriber::Transcriber;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub queue: JobQueue,
    pub blobs: BlobStore,
    pub transcriber: Arc<dyn Transcriber>,
    pub config: Arc<ServiceConfig>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        queue: JobQueue,
        blobs: BlobStore,
        transcriber: Arc<dyn Transcriber>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            db,
            queue,
            blobs,
            transcriber,
            config: Arc::new(config),
            started_at: Utc::now(),
        }
    }
}

/// Build the HTTP router
///
/// The body limit mirrors the configured upload cap; stored audio is
/// served read-only under /uploads.
pub fn build_router(state: AppState) -> Router {
    let uploads_dir = state.blobs.dir().to_path_buf();
    let max_body = state.config.max_upload_bytes;

    Router::new()
        .route("/api/transcribe", post(api::transcripts::transcribe))
        .route("/api/jobs/:job_id", get(api::transcripts::get_job_status))
        .route("/api/transcripts", get(api::transcripts::list_transcripts))
        .route(
            "/api/transcripts/:id",
            get(api::transcripts::get_transcript).delete(api::transcripts::delete_transcript),
        )
        .route("/api/users", post(api::users::create_user))
        .route(
            "/api/users/:id",
            get(api::users::get_user).delete(api::users::delete_user),
        )
        .route("/api/health", get(api::health::health))
        .nest_service("/uploads", ServeDir::new(uploads_dir))
        .layer(DefaultBodyLimit::max(max_body))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
