//! Worker pool
//!
//! N tokio tasks pull jobs off the queue and run the transcriber on a
//! blocking thread. Each attempt's outcome is reconciled into both the
//! jobs table and the owning transcript row.

use crate::db::transcripts;
use crate::queue::{ClaimedJob, FailDisposition, JobQueue};
use crate::transcriber::Transcriber;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Spawn `worker_count` claim loops
    ///
    /// Workers park on the queue's wakeup signal and also poll every
    /// `poll_interval` so that backoff-delayed retries get picked up.
    pub fn spawn(
        db: SqlitePool,
        queue: JobQueue,
        transcriber: Arc<dyn Transcriber>,
        worker_count: usize,
        poll_interval: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let db = db.clone();
            let queue = queue.clone();
            let transcriber = Arc::clone(&transcriber);
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, db, queue, transcriber, poll_interval, cancel).await;
            }));
        }

        info!(worker_count, "Worker pool started");
        Self { handles, cancel }
    }

    /// Stop claiming and wait for in-flight attempts to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("Worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    db: SqlitePool,
    queue: JobQueue,
    transcriber: Arc<dyn Transcriber>,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    debug!(worker_id, "Worker started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match queue.claim().await {
            Ok(Some(job)) => {
                process_job(&db, &queue, &transcriber, job).await;
            }
            Ok(None) => {
                // Idle: wake on enqueue, or poll for retries coming due
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = queue.wait_for_work() => {}
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
            Err(e) => {
                error!(worker_id, "Failed to claim job: {:#}", e);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        }
    }

    debug!(worker_id, "Worker stopped");
}

/// Run one attempt and reconcile its outcome
async fn process_job(
    db: &SqlitePool,
    queue: &JobQueue,
    transcriber: &Arc<dyn Transcriber>,
    job: ClaimedJob,
) {
    debug!(
        job_id = %job.id,
        attempt = job.attempt,
        file = %job.payload.file_name,
        "Transcription attempt starting"
    );

    let audio_path = PathBuf::from(&job.payload.audio_path);
    let worker = Arc::clone(transcriber);
    let outcome = tokio::task::spawn_blocking(move || worker.transcribe(&audio_path)).await;

    let error_text = match outcome {
        Ok(Ok(transcription)) => {
            // The job is only acked once the result is durably on the
            // transcript; a lost write becomes a failed attempt and the
            // redelivery repeats it
            match transcripts::complete_transcript(
                db,
                job.payload.transcript_id,
                &transcription.text,
                transcription.language.as_deref(),
            )
            .await
            {
                Ok(()) => {
                    info!(
                        job_id = %job.id,
                        transcript_id = job.payload.transcript_id,
                        language = transcription.language.as_deref().unwrap_or("unknown"),
                        chars = transcription.text.len(),
                        "Transcription succeeded"
                    );
                    if let Err(e) = queue.complete(&job.id, &transcription).await {
                        error!(job_id = %job.id, "Failed to acknowledge job: {:#}", e);
                    }
                    return;
                }
                Err(e) => format!("Failed to store transcript result: {:#}", e),
            }
        }
        Ok(Err(e)) => format!("{}", e),
        Err(join_err) => format!("Transcriber task panicked: {}", join_err),
    };

    warn!(
        job_id = %job.id,
        attempt = job.attempt,
        max_attempts = job.max_attempts,
        "Transcription attempt failed: {}",
        error_text
    );

    // Every failed attempt is recorded on the transcript; a later
    // successful retry flips the status back to completed
    if let Err(e) = transcripts::fail_transcript(db, job.payload.transcript_id).await {
        error!(job_id = %job.id, "Failed to mark transcript failed: {:#}", e);
    }

    match queue.fail(&job, &error_text).await {
        Ok(FailDisposition::Retry { .. }) | Ok(FailDisposition::Exhausted) => {}
        Err(e) => error!(job_id = %job.id, "Failed to record job failure: {:#}", e),
    }
}
