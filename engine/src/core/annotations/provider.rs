//! Collaborator Traits
//!
//! The model and tool seams the orchestrator drives. Implementations:
//! - `OllamaCaptioner`: vision model over HTTP
//! - `OllamaPersonIdentifier`: reference faces compared by the same model
//! - `WhisperTranscriber`: whisper.cpp (feature `whisper`)
//! - `FFmpegRunner`: frames and cover art

use std::path::Path;

use async_trait::async_trait;

use crate::core::{CoreResult, MediaKind, TimeSec};

/// Produces a one-sentence description of an image file
#[async_trait]
pub trait ImageCaptioner: Send + Sync {
    fn name(&self) -> &str;

    async fn caption(&self, image: &Path) -> CoreResult<String>;
}

/// Names the known people visible in an image
#[async_trait]
pub trait PersonIdentifier: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the names found in `image`, empty when nobody is recognized
    async fn identify(&self, image: &Path) -> CoreResult<Vec<String>>;
}

/// Turns the speech in an audio or video file into text.
///
/// Calls are blocking and run on the blocking thread pool.
pub trait Transcriber: Send + Sync {
    fn name(&self) -> &str;

    fn transcribe(&self, path: &Path, kind: MediaKind) -> CoreResult<String>;
}

/// Extracts still images from media files
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Writes the frame at `time_sec` of `video` to `output` as PNG
    async fn extract_frame(&self, video: &Path, time_sec: TimeSec, output: &Path) -> CoreResult<()>;

    /// Writes the embedded cover art of `audio` to `output`.
    /// Returns `false` when the file carries no cover.
    async fn extract_cover(&self, audio: &Path, output: &Path) -> CoreResult<bool>;
}
