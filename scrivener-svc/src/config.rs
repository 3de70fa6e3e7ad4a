//! Service configuration
//!
//! Tunables live in the settings table (seeded with defaults at first
//! boot); model selection comes from the environment so deployments can
//! switch models without touching the database.

use anyhow::{Context, Result};
use scrivener_common::db::init::get_setting_or;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::queue::RetryPolicy;

/// Model size used when WHISPER_MODEL_SIZE is unset
pub const DEFAULT_MODEL_SIZE: &str = "base";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub root_folder: PathBuf,
    pub uploads_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub worker_count: usize,
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
    pub http_host: String,
    pub http_port: u16,
    pub model_size: String,
    pub whisper_binary: PathBuf,
    pub whisper_model_path: PathBuf,
    /// Forced transcription language; None means auto-detect
    pub language: Option<String>,
}

impl ServiceConfig {
    /// Assemble the runtime configuration from settings rows and environment
    pub async fn load(pool: &SqlitePool, root_folder: &Path) -> Result<Self> {
        let max_upload_bytes = setting_parsed(pool, "max_upload_bytes", "1073741824").await?;
        let worker_count = setting_parsed(pool, "worker_count", "2").await?;
        let max_attempts: u32 = setting_parsed(pool, "job_max_attempts", "4").await?;
        let backoff_ms: u64 = setting_parsed(pool, "job_backoff_ms", "10000").await?;
        let poll_interval_ms: u64 =
            setting_parsed(pool, "queue_poll_interval_ms", "500").await?;
        let http_host = get_setting_or(pool, "http_host", "127.0.0.1").await?;
        let http_port: u16 = setting_parsed(pool, "http_port", "5740").await?;

        let model_size = std::env::var("WHISPER_MODEL_SIZE")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL_SIZE.to_string());

        let whisper_binary = std::env::var("SCRIVENER_WHISPER_BIN")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("whisper-cli"));

        let whisper_model_path = match std::env::var("SCRIVENER_WHISPER_MODEL") {
            Ok(path) => PathBuf::from(path),
            Err(_) => root_folder
                .join("models")
                .join(format!("ggml-{}.bin", model_size)),
        };

        let language = std::env::var("SCRIVENER_LANGUAGE")
            .ok()
            .filter(|s| !s.is_empty() && s != "auto");

        let config = Self {
            root_folder: root_folder.to_path_buf(),
            uploads_dir: scrivener_common::config::uploads_dir(root_folder),
            max_upload_bytes,
            worker_count,
            retry: RetryPolicy {
                max_attempts,
                backoff: Duration::from_millis(backoff_ms),
            },
            poll_interval: Duration::from_millis(poll_interval_ms),
            http_host,
            http_port,
            model_size,
            whisper_binary,
            whisper_model_path,
            language,
        };

        info!(
            model = %config.model_size,
            workers = config.worker_count,
            max_attempts = config.retry.max_attempts,
            "Configuration loaded"
        );

        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

async fn setting_parsed<T: std::str::FromStr>(
    pool: &SqlitePool,
    key: &str,
    default_value: &str,
) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = get_setting_or(pool, key, default_value).await?;
    raw.parse()
        .with_context(|| format!("Invalid value '{}' for setting '{}'", raw, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrivener_common::db::init::{create_schema, init_default_settings};

    #[tokio::test]
    async fn test_load_uses_seeded_defaults() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        create_schema(&pool).await.unwrap();
        init_default_settings(&pool).await.unwrap();

        let config = ServiceConfig::load(&pool, Path::new("/tmp/scrivener")).await.unwrap();
        assert_eq!(config.max_upload_bytes, 1_073_741_824);
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.backoff, Duration::from_secs(10));
        assert_eq!(config.http_port, 5740);
        assert_eq!(config.uploads_dir, PathBuf::from("/tmp/scrivener/uploads"));
    }

    #[tokio::test]
    async fn test_load_reads_overridden_settings() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        create_schema(&pool).await.unwrap();
        sqlx::query("INSERT INTO settings (key, value) VALUES ('worker_count', '8')")
            .execute(&pool)
            .await
            .unwrap();

        let config = ServiceConfig::load(&pool, Path::new("/tmp/scrivener")).await.unwrap();
        assert_eq!(config.worker_count, 8);
    }
}
