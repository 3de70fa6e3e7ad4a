//! Audio probing utilities
//!
//! Uses symphonia for format-agnostic decoding (WAV, MP3, FLAC, AAC, OGG...).
//! Ingestion only needs the duration, computed once and stored immutably on
//! the transcript.

use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Determine audio duration in seconds
///
/// Prefers the container's frame count; falls back to decoding the whole
/// stream and counting frames for containers that don't declare a length.
pub fn probe_duration_seconds(file_path: &Path) -> Result<f64> {
    let file = std::fs::File::open(file_path)
        .with_context(|| format!("Failed to open audio file: {}", file_path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = file_path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("Failed to probe audio file: {}", file_path.display()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio track found in file")?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .context("Sample rate unknown")? as f64;

    // Fast path: declared frame count
    if let Some(n_frames) = track.codec_params.n_frames {
        return Ok(n_frames as f64 / sample_rate);
    }

    // Slow path: decode and count frames
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .with_context(|| format!("Failed to create decoder for: {}", file_path.display()))?;

    let mut total_frames: u64 = 0;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(anyhow::anyhow!("Error reading packet: {}", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => total_frames += decoded.frames() as u64,
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                // Skip undecodable packets, consistent with lossy streams
                tracing::debug!(error = %e, "Skipping undecodable packet");
            }
            Err(e) => return Err(anyhow::anyhow!("Decode error: {}", e)),
        }
    }

    Ok(total_frames as f64 / sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, seconds: f64, sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let samples = (seconds * sample_rate as f64) as usize;
        for i in 0..samples {
            let t = i as f32 / sample_rate as f32;
            let value = (t * 440.0 * 2.0 * std::f32::consts::PI).sin();
            writer.write_sample((value * i16::MAX as f32 * 0.5) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_wav_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 2.0, 16000);

        let duration = probe_duration_seconds(&path).unwrap();
        assert!((duration - 2.0).abs() < 0.01, "got {}", duration);
    }

    #[test]
    fn test_garbage_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.wav");
        std::fs::write(&path, b"this is not audio").unwrap();

        assert!(probe_duration_seconds(&path).is_err());
    }
}
