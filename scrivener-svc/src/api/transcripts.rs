//! Transcription endpoints
//!
//! POST /api/transcribe accepts a multipart upload and answers 202 with a
//! job id before any transcription work happens. GET /api/jobs/{id} is the
//! polling surface; the remaining routes read and delete stored transcripts.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::db::transcripts;
use crate::error::{ApiError, ApiResult};
use crate::ingest::{self, Upload};
use crate::queue::status;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub user_id: Option<String>,
}

/// POST /api/transcribe
///
/// Expects multipart fields `audio` (the file), `user_id` and `user_name`.
pub async fn transcribe(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut upload: Option<Upload> = None;
    let mut user_id: Option<String> = None;
    let mut user_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("audio") => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "audio".to_string());
                let bytes = field.bytes().await.map_err(multipart_error)?;
                upload = Some(Upload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            Some("user_id") => {
                user_id = Some(field.text().await.map_err(multipart_error)?);
            }
            Some("user_name") => {
                user_name = Some(field.text().await.map_err(multipart_error)?);
            }
            other => {
                debug!(field = ?other, "Ignoring unknown multipart field");
            }
        }
    }

    let upload =
        upload.ok_or_else(|| ApiError::Validation("audio file is required".to_string()))?;
    let user_id =
        user_id.ok_or_else(|| ApiError::Validation("user_id is required".to_string()))?;
    let user_name =
        user_name.ok_or_else(|| ApiError::Validation("user_name is required".to_string()))?;

    let receipt = ingest::ingest_upload(
        &state.db,
        &state.blobs,
        &state.queue,
        state.config.max_upload_bytes,
        upload,
        &user_id,
        &user_name,
    )
    .await?;

    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

/// GET /api/jobs/{job_id}
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let status = status::get_status(&state.db, &job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Job not found: {}", job_id)))?;

    Ok(Json(status))
}

/// GET /api/transcripts?user_id=...
pub async fn list_transcripts(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<impl IntoResponse> {
    let user_id = params
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("user_id query parameter is required".to_string()))?;

    let rows = transcripts::list_transcripts_for_user(&state.db, &user_id).await?;
    Ok(Json(rows))
}

/// GET /api/transcripts/{id}
pub async fn get_transcript(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let transcript = transcripts::get_transcript(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Transcript not found: {}", id)))?;

    Ok(Json(transcript))
}

/// DELETE /api/transcripts/{id}
pub async fn delete_transcript(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    if transcripts::get_transcript(&state.db, id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Transcript not found: {}", id)));
    }

    transcripts::delete_transcript(&state.db, id).await?;
    Ok(Json(json!({ "message": "Transcript deleted" })))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("Upload exceeds the configured size limit".to_string())
    } else {
        ApiError::Validation(format!("Malformed multipart request: {}", err.body_text()))
    }
}
