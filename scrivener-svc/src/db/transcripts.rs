//! Transcript database operations
//!
//! Lifecycle writes are single-statement and therefore atomic per row.
//! `complete_transcript` / `fail_transcript` tolerate a row that has been
//! deleted while the job was in flight: the worker must not fail because a
//! user cleaned up mid-transcription.

use crate::models::{NewTranscript, Transcript};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{debug, warn};

/// Create a transcript record
///
/// Status is forced to `processing` and job_id to NULL regardless of caller
/// input; `text` starts empty.
pub async fn create_transcript(pool: &SqlitePool, fields: NewTranscript) -> Result<Transcript> {
    let row = sqlx::query(
        r#"
        INSERT INTO transcripts (user_id, file_name, file_path, text, duration, status, job_id, created_at)
        VALUES (?, ?, ?, '', ?, 'processing', NULL, ?)
        RETURNING id, user_id, file_name, file_path, text, duration, language, status, job_id, created_at
        "#,
    )
    .bind(&fields.user_id)
    .bind(&fields.file_name)
    .bind(&fields.file_path)
    .bind(fields.duration)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .context("Failed to create transcript")?;

    Ok(Transcript::from_row(&row)?)
}

/// Record the job id once the queue has accepted the job
pub async fn set_job_id(pool: &SqlitePool, transcript_id: i64, job_id: &str) -> Result<()> {
    sqlx::query("UPDATE transcripts SET job_id = ? WHERE id = ? AND job_id IS NULL")
        .bind(job_id)
        .bind(transcript_id)
        .execute(pool)
        .await
        .context("Failed to set transcript job id")?;

    Ok(())
}

/// Mark a transcript completed with the transcribed text and language
///
/// No-op if the transcript no longer exists.
pub async fn complete_transcript(
    pool: &SqlitePool,
    transcript_id: i64,
    text: &str,
    language: Option<&str>,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE transcripts SET text = ?, language = ?, status = 'completed' WHERE id = ?",
    )
    .bind(text)
    .bind(language)
    .bind(transcript_id)
    .execute(pool)
    .await
    .context("Failed to complete transcript")?;

    if result.rows_affected() == 0 {
        debug!(transcript_id, "Transcript gone before completion; ignoring");
    }

    Ok(())
}

/// Mark a transcript failed
///
/// No-op if the transcript no longer exists. Called on every failed attempt;
/// a later successful retry overwrites the status with `completed`.
pub async fn fail_transcript(pool: &SqlitePool, transcript_id: i64) -> Result<()> {
    let result = sqlx::query("UPDATE transcripts SET status = 'failed' WHERE id = ?")
        .bind(transcript_id)
        .execute(pool)
        .await
        .context("Failed to mark transcript failed")?;

    if result.rows_affected() == 0 {
        debug!(transcript_id, "Transcript gone before failure mark; ignoring");
    }

    Ok(())
}

/// Load one transcript by id
pub async fn get_transcript(pool: &SqlitePool, transcript_id: i64) -> Result<Option<Transcript>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, file_name, file_path, text, duration, language, status, job_id, created_at
        FROM transcripts
        WHERE id = ?
        "#,
    )
    .bind(transcript_id)
    .fetch_optional(pool)
    .await
    .context("Failed to load transcript")?;

    match row {
        Some(row) => Ok(Some(Transcript::from_row(&row)?)),
        None => Ok(None),
    }
}

/// List a user's transcripts, newest first
pub async fn list_transcripts_for_user(pool: &SqlitePool, user_id: &str) -> Result<Vec<Transcript>> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, file_name, file_path, text, duration, language, status, job_id, created_at
        FROM transcripts
        WHERE user_id = ?
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to list transcripts")?;

    let mut transcripts = Vec::with_capacity(rows.len());
    for row in rows {
        transcripts.push(Transcript::from_row(&row)?);
    }

    Ok(transcripts)
}

/// Delete a transcript and its audio blob
///
/// Blob and row are treated as one logical unit: the blob goes first (absence
/// tolerated), then the row. Errors if the record does not exist.
pub async fn delete_transcript(pool: &SqlitePool, transcript_id: i64) -> Result<()> {
    let Some(transcript) = get_transcript(pool, transcript_id).await? else {
        bail!("Transcript {} not found", transcript_id);
    };

    match tokio::fs::remove_file(Path::new(&transcript.file_path)).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %transcript.file_path, "Audio blob already absent on delete");
        }
        Err(e) => warn!(path = %transcript.file_path, error = %e, "Failed to remove audio blob"),
    }

    sqlx::query("DELETE FROM transcripts WHERE id = ?")
        .bind(transcript_id)
        .execute(pool)
        .await
        .context("Failed to delete transcript")?;

    Ok(())
}
