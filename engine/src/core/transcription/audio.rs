//! Speech Audio Preparation
//!
//! Whisper consumes 16 kHz mono PCM. Every audio or video file is first
//! decoded by ffmpeg into a scratch WAV file, then read back with hound.

use std::path::Path;
use std::process::{Command, Stdio};

use thiserror::Error;

use crate::core::process::configure_std_command;
use crate::core::CoreError;

/// Sample rate Whisper expects
pub const SPEECH_SAMPLE_RATE: u32 = 16_000;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while preparing speech audio
#[derive(Error, Debug)]
pub enum AudioExtractionError {
    /// ffmpeg could not be started
    #[error("FFmpeg execution failed: {0}")]
    FFmpegFailed(String),

    /// ffmpeg exited with an error
    #[error("FFmpeg process exited with error: {0}")]
    ProcessError(String),

    #[error("Input file not found: {0}")]
    InputNotFound(String),

    #[error("Output directory does not exist: {0}")]
    OutputDirNotFound(String),

    /// The WAV file is unreadable or has the wrong layout
    #[error("Unexpected WAV format: {0}")]
    WavFormat(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for audio extraction operations
pub type AudioResult<T> = Result<T, AudioExtractionError>;

impl From<AudioExtractionError> for CoreError {
    fn from(err: AudioExtractionError) -> Self {
        match err {
            AudioExtractionError::InputNotFound(path) => CoreError::FileNotFound(path),
            AudioExtractionError::IoError(e) => CoreError::IoError(e),
            other => CoreError::FFmpegError(other.to_string()),
        }
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// Decodes the first audio stream of `input_path` into a 16 kHz mono
/// 16-bit WAV at `output_path`.
pub fn extract_audio_for_transcription(
    input_path: &Path,
    output_path: &Path,
    ffmpeg_path: &Path,
) -> AudioResult<()> {
    if !input_path.exists() {
        return Err(AudioExtractionError::InputNotFound(
            input_path.display().to_string(),
        ));
    }

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(AudioExtractionError::OutputDirNotFound(
                parent.display().to_string(),
            ));
        }
    }

    let mut cmd = Command::new(ffmpeg_path);
    configure_std_command(&mut cmd);
    let output = cmd
        .args(["-hide_banner", "-nostdin", "-i"])
        .arg(input_path)
        .args([
            "-vn",
            "-ar",
            "16000",
            "-ac",
            "1",
            "-c:a",
            "pcm_s16le",
            "-y",
        ])
        .arg(output_path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| AudioExtractionError::FFmpegFailed(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AudioExtractionError::ProcessError(
            stderr.lines().last().unwrap_or_default().to_string(),
        ));
    }

    Ok(())
}

/// Loads a 16 kHz mono WAV as f32 samples in `[-1.0, 1.0]`
pub fn load_audio_samples(wav_path: &Path) -> AudioResult<Vec<f32>> {
    let reader = hound::WavReader::open(wav_path)
        .map_err(|e| AudioExtractionError::WavFormat(format!("Failed to open WAV file: {}", e)))?;

    let spec = reader.spec();

    if spec.sample_rate != SPEECH_SAMPLE_RATE {
        return Err(AudioExtractionError::WavFormat(format!(
            "Expected 16kHz sample rate, got {} Hz",
            spec.sample_rate
        )));
    }

    if spec.channels != 1 {
        return Err(AudioExtractionError::WavFormat(format!(
            "Expected mono audio, got {} channels",
            spec.channels
        )));
    }

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .filter_map(Result::ok)
            .map(|s| s as f32 / 32768.0)
            .collect(),
        (hound::SampleFormat::Int, 32) => reader
            .into_samples::<i32>()
            .filter_map(Result::ok)
            .map(|s| s as f32 / 2147483648.0)
            .collect(),
        (hound::SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .filter_map(Result::ok)
            .map(|s| s.clamp(-1.0, 1.0))
            .collect(),
        (format, bits) => {
            return Err(AudioExtractionError::WavFormat(format!(
                "Unsupported sample layout: {:?} {} bit",
                format, bits
            )));
        }
    };

    Ok(samples)
}
