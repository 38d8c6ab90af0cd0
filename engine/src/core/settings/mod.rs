//! Settings Persistence System
//!
//! Provides persistent analyzer settings with:
//! - Atomic file writes (temp file + rename)
//! - Schema validation with defaults
//! - Migration support for schema changes
//!
//! Storage location: {config_dir}/mediascribe/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::core::{CoreError, CoreResult};

/// Settings schema version for migration support
pub const SETTINGS_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE: &str = "settings.json";

/// Lock file name (advisory lock to prevent concurrent writers)
pub const SETTINGS_LOCK_FILE: &str = "settings.json.lock";

/// Minimum trimmed length for a stored value to count as already computed
pub const COMPUTED_MIN_CHARS: usize = 4;

/// Analyzer settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerSettings {
    /// Schema version for migrations
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub analysis: AnalysisSettings,

    #[serde(default)]
    pub transcription: TranscriptionSettings,

    #[serde(default)]
    pub captioning: CaptioningSettings,

    #[serde(default)]
    pub persons: PersonSettings,

    #[serde(default)]
    pub geo: GeoSettings,

    #[serde(default)]
    pub metadata: MetadataSettings,

    #[serde(default)]
    pub tools: ToolSettings,

    #[serde(default)]
    pub export: ExportSettings,

    /// Scratch directory for extracted audio; the system temp dir when unset
    #[serde(default)]
    pub cache_dir: Option<String>,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            analysis: AnalysisSettings::default(),
            transcription: TranscriptionSettings::default(),
            captioning: CaptioningSettings::default(),
            persons: PersonSettings::default(),
            geo: GeoSettings::default(),
            metadata: MetadataSettings::default(),
            tools: ToolSettings::default(),
            export: ExportSettings::default(),
            cache_dir: None,
        }
    }
}

impl AnalyzerSettings {
    /// Normalizes and clamps settings so persisted state is always valid.
    ///
    /// This is intentionally tolerant: it corrects bad values instead of failing.
    pub fn normalize(&mut self) {
        self.version = SETTINGS_VERSION;

        self.analysis.frame_interval_secs =
            clamp_f64(self.analysis.frame_interval_secs, 1.0, 3600.0);
        self.analysis.min_cached_chars = self.analysis.min_cached_chars.clamp(1, 64);

        self.transcription.pool_size = self.transcription.pool_size.clamp(1, 8);
        self.transcription.idle_wait_secs = self.transcription.idle_wait_secs.clamp(1, 600);
        self.transcription.model = normalize_enum(
            &self.transcription.model,
            &["tiny", "base", "small", "medium", "large"],
            default_whisper_model(),
        );

        self.captioning.timeout_secs = self.captioning.timeout_secs.clamp(5, 900);

        self.geo.precision = self.geo.precision.clamp(0, 7);
        self.geo.timeout_secs = self.geo.timeout_secs.clamp(1, 60);
        self.geo.cache_capacity = self.geo.cache_capacity.clamp(1, 1_000_000);

        self.metadata.encoding = normalize_enum(
            &self.metadata.encoding,
            &["utf8", "latin1"],
            default_encoding(),
        );

        self.export.format = normalize_enum(&self.export.format, &["csv", "json"], default_export_format());
        if self.export.file_name.trim().is_empty() {
            self.export.file_name = default_export_file_name();
        }
    }

    /// Rejects configurations that cannot run at all.
    ///
    /// This is the only check that aborts a run before any file is touched.
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(dir) = self.cache_dir.as_deref() {
            if !Path::new(dir).is_dir() {
                return Err(CoreError::InvalidConfig(format!(
                    "cacheDir does not exist or is not a directory: {}",
                    dir
                )));
            }
        }
        if self.persons.enabled {
            match self.persons.faces_dir.as_deref() {
                Some(dir) if Path::new(dir).is_dir() => {}
                Some(dir) => {
                    return Err(CoreError::InvalidConfig(format!(
                        "persons.facesDir does not exist or is not a directory: {}",
                        dir
                    )))
                }
                None => {
                    return Err(CoreError::InvalidConfig(
                        "persons.facesDir must be set when person identification is enabled"
                            .to_string(),
                    ))
                }
            }
        }
        if self.geo.enabled && self.geo.user_agent.trim().is_empty() {
            return Err(CoreError::InvalidConfig(
                "geo.userAgent must be set when geocoding is enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Directory used for temporary audio extraction
    pub fn scratch_dir(&self) -> PathBuf {
        self.cache_dir
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir)
    }
}

fn clamp_f64(value: f64, min: f64, max: f64) -> f64 {
    if !value.is_finite() {
        return min;
    }
    value.clamp(min, max)
}

fn normalize_enum(value: &str, allowed: &[&str], fallback: String) -> String {
    if allowed.iter().any(|v| v.eq_ignore_ascii_case(value)) {
        value.to_ascii_lowercase()
    } else {
        fallback
    }
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

// =============================================================================
// Analysis
// =============================================================================

/// Per-file pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSettings {
    /// Seconds between sampled video frames
    #[serde(default = "default_frame_interval")]
    pub frame_interval_secs: f64,

    /// Keep extracted video frames next to the source
    #[serde(default = "default_false")]
    pub keep_frames: bool,

    /// Minimum trimmed length of a stored value to skip recomputation
    #[serde(default = "default_min_cached_chars")]
    pub min_cached_chars: usize,

    /// Append "taken near <landmark>" to freshly computed image captions
    #[serde(default = "default_true")]
    pub merge_landmark_into_caption: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            frame_interval_secs: default_frame_interval(),
            keep_frames: false,
            min_cached_chars: default_min_cached_chars(),
            merge_landmark_into_caption: true,
        }
    }
}

fn default_frame_interval() -> f64 {
    10.0
}

fn default_min_cached_chars() -> usize {
    COMPUTED_MIN_CHARS
}

// =============================================================================
// Transcription
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionSettings {
    /// Whisper model size (tiny, base, small, medium, large)
    #[serde(default = "default_whisper_model")]
    pub model: String,

    /// Directory holding ggml model files; the platform data dir when unset
    #[serde(default)]
    pub models_dir: Option<String>,

    /// Language code or "auto"
    #[serde(default = "default_language")]
    pub language: String,

    /// Number of transcription workers
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Seconds an idle worker waits before logging and waiting again
    #[serde(default = "default_idle_wait")]
    pub idle_wait_secs: u64,

    /// Write transcript sidecar files next to the media
    #[serde(default = "default_false")]
    pub write_sidecar: bool,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            model: default_whisper_model(),
            models_dir: None,
            language: default_language(),
            pool_size: default_pool_size(),
            idle_wait_secs: default_idle_wait(),
            write_sidecar: false,
        }
    }
}

impl TranscriptionSettings {
    pub fn idle_wait(&self) -> Duration {
        Duration::from_secs(self.idle_wait_secs)
    }
}

fn default_whisper_model() -> String {
    "small".to_string()
}

fn default_language() -> String {
    "auto".to_string()
}

fn default_pool_size() -> usize {
    1
}

fn default_idle_wait() -> u64 {
    10
}

// =============================================================================
// Captioning
// =============================================================================

/// Vision model endpoint (Ollama)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptioningSettings {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,

    #[serde(default = "default_vision_model")]
    pub model: String,

    #[serde(default = "default_caption_prompt")]
    pub prompt: String,

    #[serde(default = "default_caption_timeout")]
    pub timeout_secs: u64,
}

impl Default for CaptioningSettings {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            model: default_vision_model(),
            prompt: default_caption_prompt(),
            timeout_secs: default_caption_timeout(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_vision_model() -> String {
    "llava".to_string()
}

fn default_caption_prompt() -> String {
    "Describe this image in one short sentence.".to_string()
}

fn default_caption_timeout() -> u64 {
    120
}

// =============================================================================
// Persons
// =============================================================================

/// Person identification against a folder of reference faces.
///
/// `facesDir` holds one sub-folder per person, named after them, with at
/// least one portrait inside. The vision model and endpoint are shared with
/// captioning.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersonSettings {
    #[serde(default = "default_false")]
    pub enabled: bool,

    #[serde(default)]
    pub faces_dir: Option<String>,
}

// =============================================================================
// Geo
// =============================================================================

/// Reverse geocoding (Nominatim)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeoSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_nominatim_url")]
    pub base_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Preferred result language (Accept-Language)
    #[serde(default = "default_geo_language")]
    pub language: String,

    /// Decimal places kept when rounding coordinates for the cache key
    #[serde(default = "default_precision")]
    pub precision: u32,

    #[serde(default = "default_geo_timeout")]
    pub timeout_secs: u64,

    /// Maximum number of cached positions
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for GeoSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_nominatim_url(),
            user_agent: default_user_agent(),
            language: default_geo_language(),
            precision: default_precision(),
            timeout_secs: default_geo_timeout(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_nominatim_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_user_agent() -> String {
    "mediascribe".to_string()
}

fn default_geo_language() -> String {
    "en".to_string()
}

fn default_precision() -> u32 {
    5
}

fn default_geo_timeout() -> u64 {
    10
}

fn default_cache_capacity() -> usize {
    10_000
}

// =============================================================================
// Metadata / Tools / Export
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSettings {
    /// Text encoding every written value must be representable in
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            encoding: default_encoding(),
        }
    }
}

fn default_encoding() -> String {
    "utf8".to_string()
}

/// Paths of external binaries; bare names are looked up on PATH
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolSettings {
    #[serde(default)]
    pub exiftool_path: Option<String>,

    #[serde(default)]
    pub ffmpeg_path: Option<String>,

    #[serde(default)]
    pub ffprobe_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportSettings {
    /// "csv" or "json"
    #[serde(default = "default_export_format")]
    pub format: String,

    /// File name written into the analyzed folder
    #[serde(default = "default_export_file_name")]
    pub file_name: String,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            format: default_export_format(),
            file_name: default_export_file_name(),
        }
    }
}

fn default_export_format() -> String {
    "csv".to_string()
}

fn default_export_file_name() -> String {
    "_media_analysis.csv".to_string()
}

// =============================================================================
// Settings Manager
// =============================================================================

/// Default settings directory: `{config_dir}/mediascribe`
pub fn default_settings_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mediascribe")
}

/// Settings manager for loading, saving, and resetting settings
pub struct SettingsManager {
    settings_path: PathBuf,
}

impl SettingsManager {
    /// Create a new settings manager rooted at `config_dir`
    pub fn new(config_dir: PathBuf) -> Self {
        Self {
            settings_path: config_dir.join(SETTINGS_FILE),
        }
    }

    fn lock_path(&self) -> PathBuf {
        self.settings_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(SETTINGS_LOCK_FILE)
    }

    fn with_lock<T>(&self, exclusive: bool, op: impl FnOnce() -> CoreResult<T>) -> CoreResult<T> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())?;

        if exclusive {
            fs2::FileExt::lock_exclusive(&lock_file)?;
        } else {
            fs2::FileExt::lock_shared(&lock_file)?;
        }

        let result = op();

        if let Err(e) = fs2::FileExt::unlock(&lock_file) {
            warn!("Failed to unlock settings lock file: {}", e);
        }

        result
    }

    /// Get the settings file path
    pub fn settings_path(&self) -> &PathBuf {
        &self.settings_path
    }

    /// Load settings from disk, returning defaults if the file is missing or unreadable
    pub fn load(&self) -> AnalyzerSettings {
        let result = self.with_lock(false, || {
            if !self.settings_path.exists() {
                info!("Settings file not found, using defaults");
                return Ok(AnalyzerSettings::default());
            }

            let content = fs::read_to_string(&self.settings_path)?;
            let mut settings = serde_json::from_str::<AnalyzerSettings>(&content)?;

            if settings.version < SETTINGS_VERSION {
                info!(
                    "Migrating settings from version {} to {}",
                    settings.version, SETTINGS_VERSION
                );
                settings = self.migrate(settings);
            }

            settings.normalize();
            Ok(settings)
        });

        match result {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load settings, using defaults: {}", e);
                AnalyzerSettings::default()
            }
        }
    }

    /// Save settings to disk using atomic write (temp file + rename)
    pub fn save(&self, settings: &AnalyzerSettings) -> CoreResult<AnalyzerSettings> {
        self.with_lock(true, || {
            let mut normalized = settings.clone();
            normalized.normalize();

            crate::core::fs::atomic_write_json_pretty(&self.settings_path, &normalized)?;

            info!("Settings saved to {:?}", self.settings_path);
            Ok(normalized)
        })
    }

    /// Reset settings to defaults and delete the settings file
    pub fn reset(&self) -> CoreResult<AnalyzerSettings> {
        self.with_lock(true, || {
            if self.settings_path.exists() {
                fs::remove_file(&self.settings_path)?;
                info!("Settings file deleted");
            }
            Ok(AnalyzerSettings::default())
        })
    }

    /// Migrate settings from older version
    fn migrate(&self, mut settings: AnalyzerSettings) -> AnalyzerSettings {
        // Version 0 files predate the idempotency threshold setting
        if settings.version == 0 && settings.analysis.min_cached_chars == 0 {
            settings.analysis.min_cached_chars = COMPUTED_MIN_CHARS;
        }
        settings.version = SETTINGS_VERSION;
        settings
    }
}
