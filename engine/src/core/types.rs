//! Mediascribe Core Type Definitions
//!
//! Defines fundamental types shared across the engine.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Record identifier (dense index into the record table of a run)
pub type RecordId = usize;

/// Job unique identifier (ULID)
pub type JobId = String;

/// Time in seconds (floating point)
pub type TimeSec = f64;

// =============================================================================
// Media Kind
// =============================================================================

/// Medium of a discovered file, decided from its extension
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
    Unknown,
}

impl MediaKind {
    /// Lowercase label used in logs and exports
    pub fn label(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Unknown => "unknown",
        }
    }

    /// Whether the medium carries speech that can be transcribed
    pub fn is_transcribable(&self) -> bool {
        matches!(self, MediaKind::Audio | MediaKind::Video)
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, MediaKind::Unknown)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Time Formatting
// =============================================================================

/// Formats seconds as `mm:ss`, carrying a rounded 60 into the minutes
pub fn format_mmss(seconds: TimeSec) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        0.0
    };
    let mut minutes = (total / 60.0).floor() as u64;
    let mut secs = (total - minutes as f64 * 60.0).round() as u64;
    if secs == 60 {
        minutes += 1;
        secs = 0;
    }
    format!("{:02}:{:02}", minutes, secs)
}

/// Formats a media length as `m:ss` (minutes unpadded, seconds truncated)
pub fn format_length(seconds: TimeSec) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "0:00".to_string();
    }
    let total = seconds.floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcribable_kinds() {
        assert!(MediaKind::Audio.is_transcribable());
        assert!(MediaKind::Video.is_transcribable());
        assert!(!MediaKind::Image.is_transcribable());
        assert!(!MediaKind::Unknown.is_transcribable());
    }

    #[test]
    fn test_format_mmss() {
        assert_eq!(format_mmss(0.0), "00:00");
        assert_eq!(format_mmss(10.0), "00:10");
        assert_eq!(format_mmss(75.4), "01:15");
        assert_eq!(format_mmss(59.6), "01:00");
        assert_eq!(format_mmss(-3.0), "00:00");
    }

    #[test]
    fn test_format_length() {
        assert_eq!(format_length(120.0), "2:00");
        assert_eq!(format_length(61.4), "1:01");
        assert_eq!(format_length(5.0), "0:05");
        assert_eq!(format_length(59.9), "0:59");
        assert_eq!(format_length(f64::NAN), "0:00");
    }
}
