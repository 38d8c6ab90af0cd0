//! Structural Metadata Extraction
//!
//! Capture date, GPS position and duration for each medium. Images are read
//! through their EXIF block, audio and video through FFprobe.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use chrono::{DateTime, Local, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::process::configure_std_command;
use crate::core::{CoreError, CoreResult, MediaKind, TimeSec};

/// Output format for every capture date
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Input formats accepted from EXIF and container tags
const DATE_INPUT_FORMATS: &[&str] = &[
    "%Y:%m:%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

// =============================================================================
// Types
// =============================================================================

/// Scalar metadata populated once per record
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralMetadata {
    /// Capture date formatted with [`DATE_FORMAT`]
    pub date: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Duration in seconds (audio and video)
    pub length_seconds: Option<TimeSec>,
}

impl StructuralMetadata {
    /// Returns the GPS position when both coordinates are known
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Extracts structural metadata for a classified file
pub trait MediaProbe: Send + Sync {
    fn probe(&self, path: &Path, kind: MediaKind) -> CoreResult<StructuralMetadata>;
}

// =============================================================================
// FFprobe JSON Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct FFprobeOutput {
    #[serde(default)]
    streams: Vec<FFprobeStream>,
    format: Option<FFprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FFprobeStream {
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FFprobeFormat {
    duration: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

// =============================================================================
// Metadata Extractor
// =============================================================================

/// Metadata extractor backed by EXIF (images) and FFprobe (audio/video)
#[derive(Clone, Debug)]
pub struct MetadataExtractor {
    ffprobe_path: PathBuf,
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl MetadataExtractor {
    pub fn new(ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// Reads capture date and GPS from an image's EXIF block.
    ///
    /// Images without EXIF yield empty metadata rather than an error.
    pub fn extract_image(path: &Path) -> CoreResult<StructuralMetadata> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CoreError::FileNotFound(path.display().to_string()),
            _ => CoreError::IoError(e),
        })?;
        let mut reader = BufReader::new(file);

        let exif = match exif::Reader::new().read_from_container(&mut reader) {
            Ok(exif) => exif,
            Err(
                exif::Error::NotFound(_)
                | exif::Error::NotSupported(_)
                | exif::Error::BlankValue(_),
            ) => return Ok(StructuralMetadata::default()),
            Err(exif::Error::Io(e)) => return Err(CoreError::IoError(e)),
            Err(e) => return Err(CoreError::ExifError(e.to_string())),
        };

        let date = [
            exif::Tag::DateTimeOriginal,
            exif::Tag::DateTime,
            exif::Tag::DateTimeDigitized,
        ]
        .iter()
        .find_map(|tag| exif_ascii(&exif, *tag))
        .and_then(|raw| normalize_date(&raw));

        let latitude = exif_degrees(&exif, exif::Tag::GPSLatitude, exif::Tag::GPSLatitudeRef, 'N');
        let longitude =
            exif_degrees(&exif, exif::Tag::GPSLongitude, exif::Tag::GPSLongitudeRef, 'E');

        let (latitude, longitude) = match (latitude, longitude) {
            (Some(lat), Some(lon)) if is_valid_position(lat, lon) => (Some(lat), Some(lon)),
            _ => (None, None),
        };

        Ok(StructuralMetadata {
            date,
            latitude,
            longitude,
            length_seconds: None,
        })
    }

    /// Reads date, duration and location tags through FFprobe
    pub fn extract_av(&self, path: &Path, kind: MediaKind) -> CoreResult<StructuralMetadata> {
        if !path.exists() {
            return Err(CoreError::FileNotFound(path.display().to_string()));
        }

        let mut cmd = Command::new(&self.ffprobe_path);
        configure_std_command(&mut cmd);
        let output = cmd
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_streams",
                "-show_format",
            ])
            .arg(path)
            .output()
            .map_err(|e| CoreError::FFprobeError(format!("Failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CoreError::FFprobeError(format!("FFprobe failed: {}", stderr)));
        }

        let json_str = String::from_utf8_lossy(&output.stdout);
        let mut metadata = Self::parse_ffprobe_output(&json_str, kind)?;

        if metadata.date.is_none() && kind == MediaKind::Audio {
            metadata.date = file_timestamp(path);
        }

        Ok(metadata)
    }

    /// Parses FFprobe JSON output into structural metadata
    fn parse_ffprobe_output(json: &str, kind: MediaKind) -> CoreResult<StructuralMetadata> {
        let output: FFprobeOutput = serde_json::from_str(json).map_err(|e| {
            CoreError::FFprobeError(format!("Failed to parse ffprobe output: {}", e))
        })?;

        let mut metadata = StructuralMetadata::default();
        let empty = BTreeMap::new();
        let format_tags = output.format.as_ref().map(|f| &f.tags).unwrap_or(&empty);

        metadata.length_seconds = output
            .format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0);

        let date_keys: &[&str] = match kind {
            MediaKind::Audio => &["date", "creation_time"],
            _ => &["creation_time", "com.apple.quicktime.creationdate"],
        };
        metadata.date = date_keys
            .iter()
            .find_map(|key| format_tags.get(*key))
            .or_else(|| {
                output
                    .streams
                    .iter()
                    .find_map(|s| s.tags.get("creation_time"))
            })
            .and_then(|raw| normalize_date(raw));

        // Stream tags take precedence over container tags for the position
        let position = output
            .streams
            .iter()
            .find_map(|s| coordinates_from_tags(&s.tags))
            .or_else(|| coordinates_from_tags(format_tags));
        if let Some((lat, lon)) = position {
            metadata.latitude = Some(lat);
            metadata.longitude = Some(lon);
        }

        Ok(metadata)
    }

    /// Check if FFprobe is available on the system
    pub fn is_available(&self) -> bool {
        let mut cmd = Command::new(&self.ffprobe_path);
        configure_std_command(&mut cmd);
        cmd.arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

impl MediaProbe for MetadataExtractor {
    fn probe(&self, path: &Path, kind: MediaKind) -> CoreResult<StructuralMetadata> {
        match kind {
            MediaKind::Image => Self::extract_image(path),
            MediaKind::Audio | MediaKind::Video => self.extract_av(path, kind),
            MediaKind::Unknown => Err(CoreError::UnsupportedKind {
                kind,
                operation: "metadata probe",
            }),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Normalizes EXIF / container dates to [`DATE_FORMAT`].
///
/// Unparseable non-empty values are returned trimmed but unchanged.
pub fn normalize_date(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches('\0');
    if trimmed.is_empty() {
        return None;
    }
    let head = trimmed.get(..19).unwrap_or(trimmed);
    for fmt in DATE_INPUT_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(head, fmt) {
            return Some(dt.format(DATE_FORMAT).to_string());
        }
    }
    Some(trimmed.to_string())
}

/// Parses ISO 6709 (`+48.8584+002.2945/`) or `lat,lon` style positions
pub fn parse_iso6709(value: &str) -> Option<(f64, f64)> {
    static ISO: OnceLock<Option<Regex>> = OnceLock::new();
    static PAIR: OnceLock<Option<Regex>> = OnceLock::new();

    let iso = ISO.get_or_init(|| Regex::new(r"([+-]?\d+\.\d+)([+-]\d+\.\d+)").ok());
    let pair = PAIR.get_or_init(|| Regex::new(r"([+-]?\d+\.\d+)[,\s;]+([+-]?\d+\.\d+)").ok());

    let value = value.trim();
    for re in [iso, pair].into_iter().flatten() {
        if let Some(caps) = re.captures(value) {
            let lat = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok());
            let lon = caps.get(2).and_then(|m| m.as_str().parse::<f64>().ok());
            if let (Some(lat), Some(lon)) = (lat, lon) {
                if is_valid_position(lat, lon) {
                    return Some((lat, lon));
                }
            }
        }
    }
    None
}

fn coordinates_from_tags(tags: &BTreeMap<String, String>) -> Option<(f64, f64)> {
    tags.iter().find_map(|(key, value)| {
        let key = key.to_ascii_lowercase();
        let candidate = key.contains("location")
            || key.contains("geolocation")
            || key.contains("gps")
            || key.contains("iso6709");
        if candidate {
            parse_iso6709(value)
        } else {
            None
        }
    })
}

fn is_valid_position(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite() && lat.abs() <= 90.0 && lon.abs() <= 180.0
}

fn exif_ascii(exif: &exif::Exif, tag: exif::Tag) -> Option<String> {
    let field = exif.get_field(tag, exif::In::PRIMARY)?;
    match field.value {
        exif::Value::Ascii(ref parts) => parts
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

fn exif_degrees(
    exif: &exif::Exif,
    value_tag: exif::Tag,
    ref_tag: exif::Tag,
    positive_ref: char,
) -> Option<f64> {
    let field = exif.get_field(value_tag, exif::In::PRIMARY)?;
    let degrees = match field.value {
        exif::Value::Rational(ref v) if v.len() >= 3 => {
            v[0].to_f64() + v[1].to_f64() / 60.0 + v[2].to_f64() / 3600.0
        }
        exif::Value::Rational(ref v) if !v.is_empty() => v[0].to_f64(),
        _ => return None,
    };
    if !degrees.is_finite() {
        return None;
    }

    let positive = exif_ascii(exif, ref_tag)
        .and_then(|r| r.chars().next())
        .map(|c| c.eq_ignore_ascii_case(&positive_ref))
        .unwrap_or(true);

    Some(if positive { degrees } else { -degrees })
}

/// File modification time formatted with [`DATE_FORMAT`]
pub fn file_timestamp(path: &Path) -> Option<String> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let local: DateTime<Local> = modified.into();
    Some(local.format(DATE_FORMAT).to_string())
}

// =============================================================================
// Tests
// =============================================================================
