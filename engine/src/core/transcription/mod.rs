//! Transcription Module
//!
//! Adapts whisper.cpp to the [`Transcriber`] seam: ffmpeg decodes the
//! media into a scratch WAV, whisper turns it into text, the WAV is removed.

pub mod audio;
pub mod whisper;

use std::path::{Path, PathBuf};

use crate::core::annotations::Transcriber;
use crate::core::process::resolve_tool;
use crate::core::settings::AnalyzerSettings;
use crate::core::{CoreError, CoreResult, MediaKind};

pub use audio::{extract_audio_for_transcription, load_audio_samples, AudioExtractionError};
pub use whisper::{
    default_models_dir, model_path, TranscriptionOptions, WhisperEngine, WhisperError,
    WhisperModel,
};

// =============================================================================
// Whisper Transcriber
// =============================================================================

pub struct WhisperTranscriber {
    engine: WhisperEngine,
    options: TranscriptionOptions,
    ffmpeg_path: PathBuf,
    scratch_dir: PathBuf,
}

impl WhisperTranscriber {
    /// Loads the configured model. Fails when the weights are missing or the
    /// crate was built without the `whisper` feature.
    pub fn load(settings: &AnalyzerSettings) -> CoreResult<Self> {
        let model: WhisperModel = settings.transcription.model.parse()?;
        let path = model_path(settings.transcription.models_dir.as_deref(), model);
        let engine = WhisperEngine::new(&path)?;

        tracing::info!(
            "Loaded whisper model {} from {}",
            model.name(),
            path.display()
        );

        Ok(Self {
            engine,
            options: TranscriptionOptions::for_language(&settings.transcription.language),
            ffmpeg_path: resolve_tool(settings.tools.ffmpeg_path.as_deref(), "ffmpeg"),
            scratch_dir: settings.scratch_dir(),
        })
    }

    fn scratch_wav(&self) -> PathBuf {
        self.scratch_dir
            .join(format!("mediascribe_{}.wav", uuid::Uuid::new_v4()))
    }
}

impl Transcriber for WhisperTranscriber {
    fn name(&self) -> &str {
        self.engine.label()
    }

    fn transcribe(&self, path: &Path, kind: MediaKind) -> CoreResult<String> {
        if !kind.is_transcribable() {
            return Err(CoreError::UnsupportedKind {
                kind,
                operation: "transcription",
            });
        }

        let wav = self.scratch_wav();
        let result = extract_audio_for_transcription(path, &wav, &self.ffmpeg_path)
            .map_err(CoreError::from)
            .and_then(|()| {
                self.engine
                    .transcribe_file(&wav, &self.options)
                    .map_err(CoreError::from)
            });

        if wav.exists() {
            if let Err(e) = std::fs::remove_file(&wav) {
                tracing::warn!("Failed to remove scratch audio {}: {}", wav.display(), e);
            }
        }

        result
    }
}

// =============================================================================
// Unavailable Transcriber
// =============================================================================

/// Stands in when no model could be loaded; every job fails with the
/// load error so the run still captions and geocodes.
pub struct UnavailableTranscriber {
    reason: String,
}

impl UnavailableTranscriber {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Transcriber for UnavailableTranscriber {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn transcribe(&self, _path: &Path, _kind: MediaKind) -> CoreResult<String> {
        Err(CoreError::TranscriptionFailed(self.reason.clone()))
    }
}

/// Loads whisper, or a transcriber that reports why it could not
pub fn load_transcriber(settings: &AnalyzerSettings) -> Box<dyn Transcriber> {
    match WhisperTranscriber::load(settings) {
        Ok(transcriber) => Box::new(transcriber),
        Err(e) => {
            tracing::warn!("Transcription unavailable: {}", e);
            Box::new(UnavailableTranscriber::new(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unavailable_transcriber_reports_reason() {
        let transcriber = UnavailableTranscriber::new("model missing");
        let err = transcriber
            .transcribe(Path::new("talk.mp3"), MediaKind::Audio)
            .unwrap_err();
        assert!(err.to_string().contains("model missing"));
    }

    #[test]
    fn test_load_without_model_falls_back() {
        let dir = TempDir::new().unwrap();
        let mut settings = AnalyzerSettings::default();
        settings.transcription.models_dir = Some(dir.path().to_string_lossy().to_string());

        assert!(WhisperTranscriber::load(&settings).is_err());

        let transcriber = load_transcriber(&settings);
        assert_eq!(transcriber.name(), "unavailable");
        assert!(transcriber
            .transcribe(&dir.path().join("talk.mp3"), MediaKind::Audio)
            .is_err());
    }

    #[test]
    fn test_unknown_model_name_is_rejected() {
        let mut settings = AnalyzerSettings::default();
        settings.transcription.model = "gigantic".to_string();
        assert!(matches!(
            WhisperTranscriber::load(&settings),
            Err(CoreError::TranscriptionFailed(_)) | Err(CoreError::InvalidConfig(_))
        ));
    }
}
