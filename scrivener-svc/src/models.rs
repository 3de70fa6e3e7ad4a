//! Persisted entity types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};

/// A registered user (id is externally issued by the auth provider)
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Transcript lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptStatus {
    Processing,
    Completed,
    Failed,
}

impl TranscriptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptStatus::Processing => "processing",
            TranscriptStatus::Completed => "completed",
            TranscriptStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(TranscriptStatus::Processing),
            "completed" => Some(TranscriptStatus::Completed),
            "failed" => Some(TranscriptStatus::Failed),
            _ => None,
        }
    }
}

/// One transcription attempt's persisted state
///
/// `text` stays empty and `language` NULL until a worker run succeeds.
/// `job_id` is a polling convenience; the transcript completes by id even if
/// the job_id write was lost after enqueue.
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub id: i64,
    pub user_id: String,
    pub file_name: String,
    pub file_path: String,
    pub text: String,
    pub duration: f64,
    pub language: Option<String>,
    pub status: TranscriptStatus,
    pub job_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transcript {
    pub fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let status_str: String = row.try_get("status")?;
        let status = TranscriptStatus::parse(&status_str).ok_or_else(|| {
            sqlx::Error::ColumnDecode {
                index: "status".to_string(),
                source: format!("unknown transcript status '{}'", status_str).into(),
            }
        })?;

        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            file_name: row.try_get("file_name")?,
            file_path: row.try_get("file_path")?,
            text: row.try_get("text")?,
            duration: row.try_get("duration")?,
            language: row.try_get("language")?,
            status,
            job_id: row.try_get("job_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Fields supplied by ingestion when creating a transcript
///
/// Status and job_id are not accepted here: creation always forces
/// status=processing and job_id=NULL.
#[derive(Debug, Clone)]
pub struct NewTranscript {
    pub user_id: String,
    pub file_name: String,
    pub file_path: String,
    pub duration: f64,
}
