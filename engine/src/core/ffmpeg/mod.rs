//! FFmpeg Integration Module
//!
//! Still-image extraction for captioning:
//! - Video frames at fixed intervals
//! - Embedded cover art of audio files
//!
//! The binary comes from `tools.ffmpegPath` or is looked up on `PATH`.

mod runner;

pub use runner::FFmpegRunner;

use crate::core::CoreError;

/// FFmpeg-related error types
#[derive(Debug, thiserror::Error)]
pub enum FFmpegError {
    #[error("FFmpeg not found. Install FFmpeg or set tools.ffmpegPath.")]
    NotFound,

    #[error("FFmpeg execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Invalid input file: {0}")]
    InvalidInput(String),

    #[error("Output path error: {0}")]
    OutputError(String),

    #[error("Process error: {0}")]
    ProcessError(#[from] std::io::Error),
}

pub type FFmpegResult<T> = Result<T, FFmpegError>;

impl From<FFmpegError> for CoreError {
    fn from(err: FFmpegError) -> Self {
        match err {
            FFmpegError::InvalidInput(path) => CoreError::FileNotFound(path),
            other => CoreError::FFmpegError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffmpeg_error_display() {
        let err = FFmpegError::NotFound;
        assert!(err.to_string().contains("FFmpeg not found"));

        let err = FFmpegError::ExecutionFailed("exit code 1".to_string());
        assert!(err.to_string().contains("exit code 1"));
    }

    #[test]
    fn test_ffmpeg_error_into_core_error() {
        let err: CoreError = FFmpegError::InvalidInput("clip.mp4".to_string()).into();
        assert!(matches!(err, CoreError::FileNotFound(_)));

        let err: CoreError = FFmpegError::ExecutionFailed("bad codec".to_string()).into();
        assert!(matches!(err, CoreError::FFmpegError(_)));
    }
}
