//! Audio blob storage
//!
//! Uploaded audio lands in the uploads directory under a sanitized file
//! name. Name collisions are resolved by prefixing a short random token so
//! two users uploading "recording.wav" never clobber each other.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Filesystem-backed blob store rooted at the uploads directory
#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create uploads directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist an uploaded blob; returns (stored path, stored file name)
    pub async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<(PathBuf, String)> {
        let mut name = sanitize_file_name(file_name);
        let mut path = self.dir.join(&name);

        if path.exists() {
            name = format!("{}-{}", short_token(), name);
            path = self.dir.join(&name);
        }

        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write audio blob: {}", path.display()))?;

        debug!(path = %path.display(), bytes = bytes.len(), "Stored audio blob");
        Ok((path, name))
    }

    /// Remove a blob; a file that is already gone is not an error
    pub async fn delete(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove blob: {}", path.display())),
        }
    }
}

/// Reduce an untrusted upload file name to a safe basename
///
/// Keeps ASCII alphanumerics, '.', '-' and '_'; everything else becomes '_'.
/// Path separators and leading dots are stripped so the result can never
/// escape the uploads directory.
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "audio".to_string()
    } else {
        cleaned
    }
}

fn short_token() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
