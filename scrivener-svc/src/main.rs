//! scrivener-svc entry point
//!
//! Boot order matters: database and config first, then the transcriber
//! (fatal if the model is missing), then interrupted-job recovery, then
//! the worker pool, and finally the HTTP listener.

use anyhow::{Context, Result};
use scrivener_common::config as common_config;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scrivener_svc::blobs::BlobStore;
use scrivener_svc::config::ServiceConfig;
use scrivener_svc::queue::{worker::WorkerPool, JobQueue};
use scrivener_svc::transcriber::WhisperCli;
use scrivener_svc::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("scrivener-svc {} starting", env!("CARGO_PKG_VERSION"));

    let cli_root = std::env::args().nth(1);
    let root_folder =
        common_config::resolve_root_folder(cli_root.as_deref(), "SCRIVENER_ROOT_FOLDER")?;
    common_config::ensure_directories(&root_folder)?;
    info!("Root folder: {}", root_folder.display());

    let db_path = common_config::database_path(&root_folder);
    let db = scrivener_common::db::init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let config = ServiceConfig::load(&db, &root_folder).await?;

    let transcriber: Arc<dyn scrivener_svc::transcriber::Transcriber> = Arc::new(
        WhisperCli::new(
            config.whisper_binary.clone(),
            config.whisper_model_path.clone(),
            &config.model_size,
            config.language.clone(),
        )
        .context("Transcriber backend unavailable")?,
    );

    let blobs = BlobStore::new(config.uploads_dir.clone())?;
    let queue = JobQueue::new(db.clone(), config.retry.clone());

    // Jobs left running by a previous process become claimable again
    queue.recover_interrupted().await?;

    let workers = WorkerPool::spawn(
        db.clone(),
        queue.clone(),
        Arc::clone(&transcriber),
        config.worker_count,
        config.poll_interval,
    );

    let bind_address = config.bind_address();
    let state = AppState::new(db, queue, blobs, transcriber, config);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    info!("Listening on http://{}", bind_address);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Shutting down, draining workers");
    workers.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
