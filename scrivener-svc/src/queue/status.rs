//! Job status polling
//!
//! Read-only view over the jobs table, backing GET /api/jobs/{id}.
//! Status reflects the queue's own state machine; the transcript row is
//! the system of record for the finished text.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::transcriber::Transcription;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Snapshot returned to pollers
///
/// `result` is present only for succeeded jobs, `error` only for failed
/// ones; both are omitted from the JSON while empty.
#[derive(Debug, Serialize)]
pub struct JobStatus {
    pub job_id: String,
    pub state: JobState,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Transcription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Look up a job by id; `None` means the id was never issued
pub async fn get_status(pool: &SqlitePool, job_id: &str) -> Result<Option<JobStatus>> {
    let row = sqlx::query("SELECT id, state, attempts, result, last_error FROM jobs WHERE id = ?")
        .bind(job_id)
        .fetch_optional(pool)
        .await
        .context("Failed to query job status")?;

    let Some(row) = row else {
        return Ok(None);
    };

    let state_str: String = row.try_get("state")?;
    let state = JobState::parse(&state_str)
        .with_context(|| format!("Unknown job state '{}' for job {}", state_str, job_id))?;

    let result = match state {
        JobState::Succeeded => {
            let json: Option<String> = row.try_get("result")?;
            match json {
                Some(json) => Some(
                    serde_json::from_str(&json).context("Corrupt stored job result")?,
                ),
                None => None,
            }
        }
        _ => None,
    };

    let error = match state {
        JobState::Failed => row.try_get("last_error")?,
        _ => None,
    };

    Ok(Some(JobStatus {
        job_id: row.try_get("id")?,
        state,
        attempts: row.try_get::<i64, _>("attempts")? as u32,
        result,
        error,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{JobPayload, JobQueue, RetryPolicy};
    use std::time::Duration;

    async fn test_queue() -> JobQueue {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        scrivener_common::db::init::create_schema(&pool).await.unwrap();
        JobQueue::new(pool, RetryPolicy::default())
    }

    fn payload() -> JobPayload {
        JobPayload {
            audio_path: "/tmp/uploads/a.wav".to_string(),
            file_name: "a.wav".to_string(),
            user_id: "u1".to_string(),
            duration: 1.0,
            transcript_id: 1,
        }
    }

    #[tokio::test]
    async fn test_unknown_job_id_is_none() {
        let queue = test_queue().await;
        let status = get_status(queue.pool(), "no-such-job").await.unwrap();
        assert!(status.is_none());
    }

    #[tokio::test]
    async fn test_states_through_lifecycle() {
        let queue = test_queue().await;
        let job_id = queue.enqueue(&payload()).await.unwrap();

        let status = get_status(queue.pool(), &job_id).await.unwrap().unwrap();
        assert_eq!(status.state, JobState::Pending);
        assert_eq!(status.attempts, 0);
        assert!(status.result.is_none());
        assert!(status.error.is_none());

        let job = queue.claim().await.unwrap().unwrap();
        let status = get_status(queue.pool(), &job_id).await.unwrap().unwrap();
        assert_eq!(status.state, JobState::Running);
        assert_eq!(status.attempts, 1);

        queue
            .complete(
                &job.id,
                &Transcription {
                    text: "done".to_string(),
                    language: None,
                },
            )
            .await
            .unwrap();
        let status = get_status(queue.pool(), &job_id).await.unwrap().unwrap();
        assert_eq!(status.state, JobState::Succeeded);
        assert_eq!(status.result.unwrap().text, "done");
    }

    #[tokio::test]
    async fn test_failed_job_surfaces_last_error() {
        let queue = JobQueue::new(
            test_queue().await.pool().clone(),
            RetryPolicy {
                max_attempts: 1,
                backoff: Duration::from_millis(0),
            },
        );
        let job_id = queue.enqueue(&payload()).await.unwrap();

        let job = queue.claim().await.unwrap().unwrap();
        queue.fail(&job, "model exploded").await.unwrap();

        let status = get_status(queue.pool(), &job_id).await.unwrap().unwrap();
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.error.as_deref(), Some("model exploded"));
        assert!(status.result.is_none());
    }
}
