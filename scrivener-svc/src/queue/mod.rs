//! Durable job queue
//!
//! SQLite-backed work queue decoupling upload submission from transcription.
//! Jobs survive process restarts; delivery is at-least-once. The retry
//! policy (attempt budget, fixed backoff) is stored on the job row and
//! interpreted here by the redelivery logic; workers never re-enqueue
//! themselves.

pub mod status;
pub mod worker;

use crate::transcriber::Transcription;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything a worker needs to process one transcription job
///
/// Carries the transcript id so the worker can report back even when the
/// job_id write on the transcript row was lost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub audio_path: String,
    pub file_name: String,
    pub user_id: String,
    pub duration: f64,
    pub transcript_id: i64,
}

/// Per-job retry policy, interpreted by the queue's redelivery logic
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first (4 = 1 initial + 3 retries)
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff: Duration::from_secs(10),
        }
    }
}

/// A job handed to a worker; `attempt` is 1-based
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: String,
    pub payload: JobPayload,
    pub attempt: u32,
    pub max_attempts: u32,
    pub backoff_ms: i64,
}

/// Outcome of a failed attempt
#[derive(Debug, PartialEq, Eq)]
pub enum FailDisposition {
    /// Re-scheduled; the job becomes claimable again at `run_after` (ms epoch)
    Retry { run_after: i64 },
    /// Attempt budget exhausted; the job is permanently failed
    Exhausted,
}

/// Handle to the durable queue; cheap to clone
#[derive(Clone)]
pub struct JobQueue {
    db: SqlitePool,
    policy: RetryPolicy,
    notify: Arc<Notify>,
}

impl JobQueue {
    pub fn new(db: SqlitePool, policy: RetryPolicy) -> Self {
        Self {
            db,
            policy,
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Durably insert a job and return its id immediately
    ///
    /// Does not wait for execution; a parked worker is woken.
    pub async fn enqueue(&self, payload: &JobPayload) -> Result<String> {
        let job_id = Uuid::new_v4().to_string();
        let payload_json =
            serde_json::to_string(payload).context("Failed to serialize job payload")?;

        sqlx::query(
            r#"
            INSERT INTO jobs (id, payload, state, attempts, max_attempts, backoff_ms, run_after)
            VALUES (?, ?, 'pending', 0, ?, ?, ?)
            "#,
        )
        .bind(&job_id)
        .bind(&payload_json)
        .bind(self.policy.max_attempts as i64)
        .bind(self.policy.backoff.as_millis() as i64)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.db)
        .await
        .context("Failed to enqueue job")?;

        debug!(job_id = %job_id, transcript_id = payload.transcript_id, "Job enqueued");
        self.notify.notify_one();

        Ok(job_id)
    }

    /// Claim the next due job, if any
    ///
    /// The guarded UPDATE runs under SQLite's writer lock, so a job is
    /// handed to exactly one claimant. `attempts` counts up at claim time.
    pub async fn claim(&self) -> Result<Option<ClaimedJob>> {
        let now = Utc::now().timestamp_millis();

        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'running', attempts = attempts + 1, updated_at = CURRENT_TIMESTAMP
            WHERE id = (
                SELECT id FROM jobs
                WHERE state = 'pending' AND run_after <= ?
                ORDER BY run_after, created_at
                LIMIT 1
            )
            RETURNING id, payload, attempts, max_attempts, backoff_ms
            "#,
        )
        .bind(now)
        .fetch_optional(&self.db)
        .await
        .context("Failed to claim job")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let payload_json: String = row.try_get("payload")?;
        let payload: JobPayload =
            serde_json::from_str(&payload_json).context("Corrupt job payload")?;

        Ok(Some(ClaimedJob {
            id: row.try_get("id")?,
            payload,
            attempt: row.try_get::<i64, _>("attempts")? as u32,
            max_attempts: row.try_get::<i64, _>("max_attempts")? as u32,
            backoff_ms: row.try_get("backoff_ms")?,
        }))
    }

    /// Acknowledge success, storing the result for status polling
    pub async fn complete(&self, job_id: &str, result: &Transcription) -> Result<()> {
        let result_json =
            serde_json::to_string(result).context("Failed to serialize job result")?;

        sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'succeeded', result = ?, last_error = NULL, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(&result_json)
        .bind(job_id)
        .execute(&self.db)
        .await
        .context("Failed to complete job")?;

        Ok(())
    }

    /// Record a failed attempt
    ///
    /// Re-schedules the job after its backoff while the attempt budget
    /// lasts; otherwise the job is permanently failed.
    pub async fn fail(&self, job: &ClaimedJob, error: &str) -> Result<FailDisposition> {
        if job.attempt >= job.max_attempts {
            sqlx::query(
                r#"
                UPDATE jobs
                SET state = 'failed', last_error = ?, updated_at = CURRENT_TIMESTAMP
                WHERE id = ?
                "#,
            )
            .bind(error)
            .bind(&job.id)
            .execute(&self.db)
            .await
            .context("Failed to mark job failed")?;

            warn!(
                job_id = %job.id,
                attempts = job.attempt,
                "Job permanently failed, attempt budget exhausted"
            );
            return Ok(FailDisposition::Exhausted);
        }

        let run_after = Utc::now().timestamp_millis() + job.backoff_ms;

        sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'pending', run_after = ?, last_error = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(run_after)
        .bind(error)
        .bind(&job.id)
        .execute(&self.db)
        .await
        .context("Failed to reschedule job")?;

        debug!(
            job_id = %job.id,
            attempt = job.attempt,
            backoff_ms = job.backoff_ms,
            "Job re-scheduled for retry"
        );
        Ok(FailDisposition::Retry { run_after })
    }

    /// Return crashed-over jobs to the pending state
    ///
    /// A process that died mid-attempt leaves rows in `running`; calling
    /// this at startup makes them claimable again (at-least-once delivery).
    pub async fn recover_interrupted(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'pending', run_after = ?, updated_at = CURRENT_TIMESTAMP
            WHERE state = 'running'
            "#,
        )
        .bind(Utc::now().timestamp_millis())
        .execute(&self.db)
        .await
        .context("Failed to recover interrupted jobs")?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            info!(recovered, "Recovered interrupted jobs from previous run");
        }

        Ok(recovered)
    }

    /// Wait until an enqueue wakes this worker (or the caller times out)
    pub async fn wait_for_work(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn queue_with(policy: RetryPolicy) -> JobQueue {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        scrivener_common::db::init::create_schema(&pool).await.unwrap();
        JobQueue::new(pool, policy)
    }

    fn payload(transcript_id: i64) -> JobPayload {
        JobPayload {
            audio_path: "/tmp/uploads/a.wav".to_string(),
            file_name: "a.wav".to_string(),
            user_id: "u1".to_string(),
            duration: 3.2,
            transcript_id,
        }
    }

    #[tokio::test]
    async fn test_enqueue_then_claim_round_trip() {
        let queue = queue_with(RetryPolicy::default()).await;

        let job_id = queue.enqueue(&payload(1)).await.unwrap();

        let job = queue.claim().await.unwrap().expect("job should be claimable");
        assert_eq!(job.id, job_id);
        assert_eq!(job.attempt, 1);
        assert_eq!(job.max_attempts, 4);
        assert_eq!(job.payload.transcript_id, 1);

        // Running jobs are not claimable again
        assert!(queue.claim().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_distinct_job_ids() {
        let queue = queue_with(RetryPolicy::default()).await;

        let a = queue.enqueue(&payload(1)).await.unwrap();
        let b = queue.enqueue(&payload(2)).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_fail_schedules_retry_with_backoff() {
        let queue = queue_with(RetryPolicy {
            max_attempts: 4,
            backoff: Duration::from_secs(10),
        })
        .await;

        queue.enqueue(&payload(1)).await.unwrap();
        let job = queue.claim().await.unwrap().unwrap();

        let before = Utc::now().timestamp_millis();
        let disposition = queue.fail(&job, "transient").await.unwrap();

        match disposition {
            FailDisposition::Retry { run_after } => {
                assert!(run_after >= before + 10_000, "backoff must be >= 10s");
            }
            FailDisposition::Exhausted => panic!("first failure must retry"),
        }

        // Not yet due
        assert!(queue.claim().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_budget_exhaustion_after_max_attempts() {
        let queue = queue_with(RetryPolicy {
            max_attempts: 4,
            backoff: Duration::from_millis(0),
        })
        .await;

        queue.enqueue(&payload(1)).await.unwrap();

        for attempt in 1..=3 {
            let job = queue.claim().await.unwrap().unwrap();
            assert_eq!(job.attempt, attempt);
            match queue.fail(&job, "boom").await.unwrap() {
                FailDisposition::Retry { .. } => {}
                FailDisposition::Exhausted => panic!("budget not yet exhausted at attempt {attempt}"),
            }
        }

        let job = queue.claim().await.unwrap().unwrap();
        assert_eq!(job.attempt, 4);
        assert_eq!(queue.fail(&job, "boom").await.unwrap(), FailDisposition::Exhausted);

        // Permanently failed: nothing left to claim
        assert!(queue.claim().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_complete_stores_result() {
        let queue = queue_with(RetryPolicy::default()).await;

        let job_id = queue.enqueue(&payload(1)).await.unwrap();
        let job = queue.claim().await.unwrap().unwrap();

        queue
            .complete(
                &job.id,
                &Transcription {
                    text: "hello world".to_string(),
                    language: Some("en".to_string()),
                },
            )
            .await
            .unwrap();

        let status = status::get_status(queue.pool(), &job_id).await.unwrap().unwrap();
        assert_eq!(status.state, status::JobState::Succeeded);
        assert_eq!(status.result.unwrap().text, "hello world");
    }

    #[tokio::test]
    async fn test_recover_interrupted_requeues_running_jobs() {
        let queue = queue_with(RetryPolicy::default()).await;

        queue.enqueue(&payload(1)).await.unwrap();
        let job = queue.claim().await.unwrap().unwrap();
        assert!(queue.claim().await.unwrap().is_none());

        // Simulates a crash: nothing acked, process restarts
        let recovered = queue.recover_interrupted().await.unwrap();
        assert_eq!(recovered, 1);

        let redelivered = queue.claim().await.unwrap().unwrap();
        assert_eq!(redelivered.id, job.id);
        assert_eq!(redelivered.attempt, 2);
    }
}
