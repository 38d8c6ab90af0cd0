//! Media Classifier
//!
//! Maps a file path to its medium from the extension alone. No I/O.

use std::path::Path;

use crate::core::MediaKind;

/// Extensions recognised by [`classify`], lowercase, without the dot
pub const SUPPORTED_EXTENSIONS: &[(&str, MediaKind)] = &[
    ("jpg", MediaKind::Image),
    ("jpeg", MediaKind::Image),
    ("png", MediaKind::Image),
    ("mp4", MediaKind::Video),
    ("mov", MediaKind::Video),
    ("avi", MediaKind::Video),
    ("wav", MediaKind::Audio),
    ("mp3", MediaKind::Audio),
    ("m4a", MediaKind::Audio),
    ("flac", MediaKind::Audio),
];

/// Classifies a path by its (case-insensitive) extension
pub fn classify(path: &Path) -> MediaKind {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(classify_extension)
        .unwrap_or(MediaKind::Unknown)
}

/// Classifies a bare extension
pub fn classify_extension(ext: &str) -> MediaKind {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    SUPPORTED_EXTENSIONS
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, kind)| *kind)
        .unwrap_or(MediaKind::Unknown)
}
