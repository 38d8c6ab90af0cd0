//! Mediascribe Error Definitions
//!
//! Defines error types used throughout the engine.

use thiserror::Error;

use super::{MediaKind, RecordId};

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Media Errors
    // =========================================================================
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported media kind for {operation}: {kind}")]
    UnsupportedKind {
        kind: MediaKind,
        operation: &'static str,
    },

    #[error("FFprobe error: {0}")]
    FFprobeError(String),

    #[error("FFmpeg error: {0}")]
    FFmpegError(String),

    #[error("EXIF error: {0}")]
    ExifError(String),

    // =========================================================================
    // Metadata Errors
    // =========================================================================
    #[error("Metadata tool error: {0}")]
    MetadataToolError(String),

    #[error("Invalid text in field '{field}': {reason}")]
    InvalidText { field: String, reason: String },

    #[error("Metadata write failed for {path}: {reason}")]
    MetadataWriteFailed { path: String, reason: String },

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    #[error("Captioning failed: {0}")]
    CaptionFailed(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Reverse geocoding failed: {0}")]
    GeocodeFailed(String),

    #[error("Person identification failed: {0}")]
    PersonIdentificationFailed(String),

    // =========================================================================
    // Job Errors
    // =========================================================================
    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("Scheduler stopped: {0}")]
    SchedulerStopped(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Whether the error should stop the whole run instead of a single file
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::InvalidConfig(_))
    }
}
