//! Upload ingestion
//!
//! Ordered pipeline behind POST /api/transcribe: validate, upsert the
//! user, persist the audio blob, probe its duration, create the
//! transcript row, enqueue the job. A failure at any step undoes the
//! artifacts of earlier steps so clients never see a half-ingested
//! upload reported as accepted.

use crate::blobs::BlobStore;
use crate::db::{transcripts, users};
use crate::error::{ApiError, ApiResult};
use crate::models::NewTranscript;
use crate::queue::{JobPayload, JobQueue};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// One uploaded file, as extracted from the multipart form
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// What the client gets back with the 202
#[derive(Debug, Serialize)]
pub struct IngestReceipt {
    pub job_id: String,
    pub transcript_id: i64,
    pub status: &'static str,
}

/// Run the full ingestion pipeline for one upload
pub async fn ingest_upload(
    db: &SqlitePool,
    blobs: &BlobStore,
    queue: &JobQueue,
    max_upload_bytes: usize,
    upload: Upload,
    user_id: &str,
    user_name: &str,
) -> ApiResult<IngestReceipt> {
    if user_id.trim().is_empty() {
        return Err(ApiError::Validation("user_id is required".to_string()));
    }
    if user_name.trim().is_empty() {
        return Err(ApiError::Validation("user_name is required".to_string()));
    }
    if upload.bytes.is_empty() {
        return Err(ApiError::Validation("audio file is empty".to_string()));
    }
    if upload.bytes.len() > max_upload_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "Upload of {} bytes exceeds the {} byte limit",
            upload.bytes.len(),
            max_upload_bytes
        )));
    }

    users::upsert_user(db, user_id, user_name).await?;

    let (audio_path, stored_name) = blobs.save(&upload.file_name, &upload.bytes).await?;

    // Probing decodes the file; keep it off the async runtime
    let probe_path = audio_path.clone();
    let duration =
        match tokio::task::spawn_blocking(move || crate::audio::probe_duration_seconds(&probe_path))
            .await
        {
            Ok(Ok(seconds)) => seconds,
            Ok(Err(e)) => {
                blobs.delete(&audio_path).await?;
                return Err(ApiError::Validation(format!(
                    "Unreadable audio file: {:#}",
                    e
                )));
            }
            Err(join_err) => {
                blobs.delete(&audio_path).await?;
                return Err(ApiError::Internal(format!(
                    "Duration probe panicked: {}",
                    join_err
                )));
            }
        };

    let transcript = match transcripts::create_transcript(
        db,
        NewTranscript {
            user_id: user_id.to_string(),
            file_name: stored_name.clone(),
            file_path: audio_path.to_string_lossy().to_string(),
            duration,
        },
    )
    .await
    {
        Ok(t) => t,
        Err(e) => {
            blobs.delete(&audio_path).await?;
            return Err(e.into());
        }
    };

    let payload = JobPayload {
        audio_path: audio_path.to_string_lossy().to_string(),
        file_name: stored_name.clone(),
        user_id: user_id.to_string(),
        duration,
        transcript_id: transcript.id,
    };

    let job_id = match queue.enqueue(&payload).await {
        Ok(id) => id,
        Err(e) => {
            // Nothing was accepted: roll the row and blob back
            let _ = transcripts::delete_transcript(db, transcript.id).await;
            blobs.delete(&audio_path).await?;
            return Err(e.into());
        }
    };

    // The job carries the transcript id, so losing this back-pointer only
    // costs the transcript -> job lookup. Not worth rejecting the upload.
    if let Err(e) = transcripts::set_job_id(db, transcript.id, &job_id).await {
        warn!(
            transcript_id = transcript.id,
            job_id = %job_id,
            "Failed to record job id on transcript: {:#}",
            e
        );
    }

    info!(
        job_id = %job_id,
        transcript_id = transcript.id,
        user_id = %user_id,
        file = %stored_name,
        duration_s = duration,
        "Upload accepted"
    );

    Ok(IngestReceipt {
        job_id,
        transcript_id: transcript.id,
        status: "processing",
    })
}
