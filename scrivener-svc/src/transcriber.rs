//! Transcriber capability
//!
//! The worker only depends on the `Transcriber` trait; the concrete backend
//! shells out to a whisper.cpp CLI binary. The handle is constructed once at
//! startup and injected into the worker pool; a missing binary or model is
//! fatal at boot, not at first job.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

/// Transcription outcome: the full text plus the detected language, when
/// detection succeeded. Silent audio legitimately yields empty text and no
/// language.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Transcription {
    pub text: String,
    pub language: Option<String>,
}

/// Errors from a transcription attempt
///
/// All attempt failures are candidates for queue-level retry; the queue's
/// attempt budget bounds how often.
#[derive(Debug, Error)]
pub enum TranscribeError {
    /// The backend failed in a way a retry may fix (process killed, resource
    /// exhaustion, transient I/O)
    #[error("Transcription failed: {0}")]
    Transient(String),

    /// I/O error launching or reading from the backend
    #[error("Transcriber IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Speech-to-text capability
///
/// Implementations block for the full transcription; callers are expected to
/// run them on a blocking-capable thread.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio_path: &Path) -> Result<Transcription, TranscribeError>;

    /// Model identity for the health surface (e.g. "whisper-base")
    fn model(&self) -> &str;

    /// Compute device in use (e.g. "cpu")
    fn device(&self) -> &str;
}

/// whisper.cpp CLI backend
///
/// Invokes the whisper-cli binary per file. The CLI chunks long audio
/// internally (~30 s windows) and concatenates the decoded text; language
/// identification runs on the first window when `-l auto` is passed.
pub struct WhisperCli {
    binary_path: PathBuf,
    model_path: PathBuf,
    model_name: String,
    /// Forced language code, or None for auto-detection
    language: Option<String>,
    device: String,
}

impl WhisperCli {
    /// Build and validate the backend
    ///
    /// Fails when the binary or model file is missing so a misconfigured
    /// deployment dies at startup instead of failing every job.
    pub fn new(
        binary_path: PathBuf,
        model_path: PathBuf,
        model_size: &str,
        language: Option<String>,
    ) -> Result<Self> {
        if !model_path.exists() {
            bail!("Whisper model not found: {}", model_path.display());
        }

        // Absolute/relative paths must exist; bare names are looked up in PATH
        if binary_path.components().count() > 1 && !binary_path.exists() {
            bail!("Whisper binary not found: {}", binary_path.display());
        }

        let backend = Self {
            binary_path,
            model_path,
            model_name: format!("whisper-{}", model_size),
            language,
            device: "cpu".to_string(),
        };

        info!(
            model = %backend.model_name,
            model_path = %backend.model_path.display(),
            device = %backend.device,
            "Whisper backend ready"
        );

        Ok(backend)
    }
}

impl Transcriber for WhisperCli {
    fn transcribe(&self, audio_path: &Path) -> Result<Transcription, TranscribeError> {
        let lang = self.language.as_deref().unwrap_or("auto");

        debug!(path = %audio_path.display(), lang, "Invoking whisper CLI");

        let output = Command::new(&self.binary_path)
            .arg("-m")
            .arg(&self.model_path)
            .arg("-f")
            .arg(audio_path)
            .arg("-l")
            .arg(lang)
            .arg("-nt") // no timestamps, plain text on stdout
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TranscribeError::Transient(format!(
                "whisper exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();

        // Forced language wins; otherwise best-effort parse of the detector's
        // stderr line, None when detection failed or never ran
        let language = match &self.language {
            Some(code) => Some(code.clone()),
            None => parse_detected_language(&String::from_utf8_lossy(&output.stderr)),
        };

        Ok(Transcription { text, language })
    }

    fn model(&self) -> &str {
        &self.model_name
    }

    fn device(&self) -> &str {
        &self.device
    }
}

/// Extract the language code from whisper.cpp's detector output, e.g.
/// `whisper_full_with_state: auto-detected language: en (p = 0.973)`
fn parse_detected_language(stderr: &str) -> Option<String> {
    let marker = "auto-detected language:";
    let idx = stderr.find(marker)?;
    let rest = &stderr[idx + marker.len()..];
    let code: String = rest
        .split_whitespace()
        .next()?
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string();

    if code.is_empty() {
        None
    } else {
        Some(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_detected_language() {
        let stderr = "whisper_init_from_file: loading model\n\
                      whisper_full_with_state: auto-detected language: en (p = 0.973110)\n";
        assert_eq!(parse_detected_language(stderr), Some("en".to_string()));
    }

    #[test]
    fn test_parse_detected_language_absent() {
        assert_eq!(parse_detected_language("no detector output here"), None);
        assert_eq!(parse_detected_language(""), None);
    }

    #[test]
    fn test_missing_model_is_fatal_at_construction() {
        let result = WhisperCli::new(
            PathBuf::from("whisper-cli"),
            PathBuf::from("/definitely/not/here/ggml-base.bin"),
            "base",
            None,
        );
        assert!(result.is_err());
    }
}
