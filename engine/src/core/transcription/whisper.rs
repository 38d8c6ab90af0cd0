//! Whisper Engine
//!
//! Speech-to-text through whisper.cpp via whisper-rs. The real engine is
//! compiled with the `whisper` feature; without it a stub reports
//! `FeatureNotEnabled` so callers can fall back cleanly.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::core::CoreError;

#[derive(Error, Debug)]
pub enum WhisperError {
    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Speech recognition failed: {0}")]
    Recognition(String),

    #[error("Whisper feature not enabled. Rebuild with --features whisper")]
    FeatureNotEnabled,
}

pub type WhisperResult<T> = Result<T, WhisperError>;

impl From<WhisperError> for CoreError {
    fn from(err: WhisperError) -> Self {
        match err {
            WhisperError::Recognition(_) => CoreError::TranscriptionFailed(err.to_string()),
            _ => CoreError::InvalidConfig(err.to_string()),
        }
    }
}

// =============================================================================
// Models
// =============================================================================

/// ggml model sizes, from fastest to most accurate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WhisperModel {
    Tiny,
    #[default]
    Base,
    Small,
    Medium,
    Large,
}

impl WhisperModel {
    pub fn name(&self) -> &'static str {
        match self {
            WhisperModel::Tiny => "tiny",
            WhisperModel::Base => "base",
            WhisperModel::Small => "small",
            WhisperModel::Medium => "medium",
            WhisperModel::Large => "large",
        }
    }

    /// `ggml-<size>.bin`
    pub fn filename(&self) -> String {
        format!("ggml-{}.bin", self.name())
    }
}

impl FromStr for WhisperModel {
    type Err = WhisperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            WhisperModel::Tiny,
            WhisperModel::Base,
            WhisperModel::Small,
            WhisperModel::Medium,
            WhisperModel::Large,
        ]
        .into_iter()
        .find(|m| m.name().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| WhisperError::ModelLoad(format!("Unknown model size: {}", s)))
    }
}

/// Platform data directory for downloaded ggml models
pub fn default_models_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mediascribe")
        .join("models")
        .join("whisper")
}

/// Resolves the weights file for `model` inside `models_dir`
pub fn model_path(models_dir: Option<&str>, model: WhisperModel) -> PathBuf {
    let dir = match models_dir.map(str::trim) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => default_models_dir(),
    };
    dir.join(model.filename())
}

/// Spoken language hint; `None` lets whisper detect it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptionOptions {
    pub language: Option<String>,
}

impl TranscriptionOptions {
    pub fn for_language(language: &str) -> Self {
        let language = language.trim().to_lowercase();
        Self {
            language: (!language.is_empty() && language != "auto").then_some(language),
        }
    }
}

/// Joins recognized segments into one transcript, dropping blank ones
pub fn join_segments<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parts: Vec<String> = segments
        .into_iter()
        .map(|s| s.as_ref().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    parts.join(" ")
}

// =============================================================================
// Engine
// =============================================================================

#[cfg(feature = "whisper")]
mod engine_impl {
    use super::*;
    use crate::core::transcription::audio::load_audio_samples;
    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    /// A loaded whisper.cpp model
    pub struct WhisperEngine {
        context: WhisperContext,
        label: String,
    }

    impl WhisperEngine {
        pub fn new(model_path: &Path) -> WhisperResult<Self> {
            let path_str = model_path
                .to_str()
                .filter(|_| model_path.exists())
                .ok_or_else(|| WhisperError::ModelNotFound(model_path.display().to_string()))?;

            let context =
                WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
                    .map_err(|e| WhisperError::ModelLoad(e.to_string()))?;

            Ok(Self {
                context,
                label: format!("whisper ({})", model_path.display()),
            })
        }

        pub fn label(&self) -> &str {
            &self.label
        }

        /// Transcribes a 16 kHz mono WAV file into plain text
        pub fn transcribe_file(
            &self,
            wav_path: &Path,
            options: &TranscriptionOptions,
        ) -> WhisperResult<String> {
            let samples = load_audio_samples(wav_path)
                .map_err(|e| WhisperError::Recognition(e.to_string()))?;
            let recognition = |e: whisper_rs::WhisperError| WhisperError::Recognition(e.to_string());

            let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
            params.set_language(options.language.as_deref());
            params.set_print_progress(false);
            params.set_print_realtime(false);
            params.set_print_timestamps(false);

            let mut state = self.context.create_state().map_err(recognition)?;
            state.full(params, &samples).map_err(recognition)?;

            let count = state.full_n_segments().map_err(recognition)?;
            let texts = (0..count)
                .map(|i| state.full_get_segment_text(i))
                .collect::<Result<Vec<_>, _>>()
                .map_err(recognition)?;

            Ok(join_segments(texts))
        }
    }
}

#[cfg(feature = "whisper")]
pub use engine_impl::WhisperEngine;

#[cfg(not(feature = "whisper"))]
#[derive(Debug)]
pub struct WhisperEngine;

#[cfg(not(feature = "whisper"))]
impl WhisperEngine {
    pub fn new(_model_path: &Path) -> WhisperResult<Self> {
        Err(WhisperError::FeatureNotEnabled)
    }

    pub fn label(&self) -> &str {
        "whisper (disabled)"
    }

    pub fn transcribe_file(
        &self,
        _wav_path: &Path,
        _options: &TranscriptionOptions,
    ) -> WhisperResult<String> {
        Err(WhisperError::FeatureNotEnabled)
    }
}
