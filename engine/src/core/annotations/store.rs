//! Metadata Store
//!
//! Reads and writes the AI-derived fields inside a media file's own
//! metadata container. The embedded values are the durable cache that makes
//! a second run over the same folder free.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::fs::{cleanup_tool_backup, TimestampSnapshot};
use crate::core::settings::COMPUTED_MIN_CHARS;
use crate::core::{CoreError, CoreResult, MediaKind};

use super::models::{is_error_marker, PENDING_SENTINEL};

// =============================================================================
// AI Fields
// =============================================================================

/// The AI-derived values stored per file
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiFields {
    pub address: String,
    pub landmark: String,
    pub caption: String,
    pub transcript: String,
    pub persons: Vec<String>,
}

impl AiFields {
    /// `address|landmark`, or just `address` without a landmark
    pub fn location_text(&self) -> String {
        if self.landmark.is_empty() {
            self.address.clone()
        } else {
            format!("{}|{}", self.address, self.landmark)
        }
    }

    /// The values as they would be persisted: error markers and the pending
    /// sentinel become empty
    pub fn sanitized(&self) -> AiFields {
        AiFields {
            address: persisted_value(&self.address).to_string(),
            landmark: persisted_value(&self.landmark).to_string(),
            caption: persisted_value(&self.caption).to_string(),
            transcript: persisted_value(&self.transcript).to_string(),
            persons: self.persons.clone(),
        }
    }

    /// Splits a stored location on its first `|`
    pub fn split_location(value: &str) -> (String, String) {
        match value.split_once('|') {
            Some((address, landmark)) => (address.trim().to_string(), landmark.trim().to_string()),
            None => (value.trim().to_string(), String::new()),
        }
    }
}

// =============================================================================
// Cache Policy
// =============================================================================

/// Decides whether a stored value counts as already computed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachePolicy {
    pub min_chars: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            min_chars: COMPUTED_MIN_CHARS,
        }
    }
}

impl CachePolicy {
    pub fn new(min_chars: usize) -> Self {
        Self {
            min_chars: min_chars.max(1),
        }
    }

    /// A value is computed when its trimmed text reaches `min_chars`
    /// characters and is not an error marker.
    pub fn is_computed(&self, value: &str) -> bool {
        let trimmed = value.trim();
        trimmed.chars().count() >= self.min_chars && !is_error_marker(trimmed)
    }

    /// Returns the value if computed, otherwise an empty string
    pub fn keep_computed(&self, value: String) -> String {
        if self.is_computed(&value) {
            value
        } else {
            String::new()
        }
    }

    /// A location counts as resolved when either of its parts is computed
    pub fn is_located(&self, address: &str, landmark: &str) -> bool {
        self.is_computed(address) || self.is_computed(landmark)
    }
}

// =============================================================================
// Text Encoding
// =============================================================================

/// Target encoding every written value must fit into
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Latin1,
}

impl FromStr for TextEncoding {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "utf8" => Ok(TextEncoding::Utf8),
            "latin1" | "iso88591" => Ok(TextEncoding::Latin1),
            other => Err(CoreError::InvalidConfig(format!(
                "Unknown metadata encoding: {}",
                other
            ))),
        }
    }
}

impl TextEncoding {
    /// Rejects control characters (other than tab and line breaks) and, for
    /// Latin-1, anything above U+00FF.
    pub fn validate(&self, field: &str, value: &str) -> CoreResult<()> {
        for ch in value.chars() {
            if ch.is_control() && !matches!(ch, '\t' | '\n' | '\r') {
                return Err(CoreError::InvalidText {
                    field: field.to_string(),
                    reason: format!("control character U+{:04X}", ch as u32),
                });
            }
            if *self == TextEncoding::Latin1 && (ch as u32) > 0xFF {
                return Err(CoreError::InvalidText {
                    field: field.to_string(),
                    reason: format!("'{}' is not representable in Latin-1", ch),
                });
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tag Backend
// =============================================================================

/// Access to a file's metadata container by tag name
pub trait TagBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Returns the values of the requested tags that are present, keyed by
    /// the requested tag name.
    fn read_tags(&self, path: &Path, tags: &[&str]) -> CoreResult<HashMap<String, String>>;

    /// Writes every `(tag, value)` pair; an empty value clears the tag
    fn write_tags(&self, path: &Path, values: &[(String, String)]) -> CoreResult<()>;
}

// =============================================================================
// Field Mapping
// =============================================================================

/// Storage locations of each semantic field for one medium
#[derive(Clone, Copy, Debug)]
pub struct FieldMap {
    pub location: &'static [&'static str],
    pub caption: &'static [&'static str],
    pub transcript: &'static [&'static str],
    pub persons: &'static [&'static str],
}

const PERSONS_TAG: &str = "XMP-iptcExt:PersonInImage";

const AUDIO_FIELDS: FieldMap = FieldMap {
    location: &[],
    caption: &["Comment"],
    transcript: &["Lyrics"],
    persons: &[],
};

const IMAGE_FIELDS: FieldMap = FieldMap {
    location: &["XMP-iptcCore:Location", "XMP-dc:Coverage"],
    caption: &["IFD0:ImageDescription", "XMP-dc:Description"],
    transcript: &[],
    persons: &[PERSONS_TAG],
};

const VIDEO_FIELDS: FieldMap = FieldMap {
    location: &["XMP-iptcCore:Location", "XMP-dc:Coverage", "ItemList:Comment"],
    caption: &["ItemList:Description", "XMP-dc:Description"],
    transcript: &["ItemList:Lyrics", "XMP-xmpDM:Lyrics"],
    persons: &[PERSONS_TAG],
};

/// Tag layout for a medium; `None` for unknown files
pub fn field_map(kind: MediaKind) -> Option<&'static FieldMap> {
    match kind {
        MediaKind::Audio => Some(&AUDIO_FIELDS),
        MediaKind::Image => Some(&IMAGE_FIELDS),
        MediaKind::Video => Some(&VIDEO_FIELDS),
        MediaKind::Unknown => None,
    }
}

impl FieldMap {
    fn all_tags(&self) -> Vec<&'static str> {
        self.location
            .iter()
            .chain(self.caption)
            .chain(self.transcript)
            .chain(self.persons)
            .copied()
            .collect()
    }
}

fn first_non_empty(values: &HashMap<String, String>, tags: &[&str]) -> String {
    tags.iter()
        .filter_map(|tag| values.get(*tag))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_default()
}

fn persisted_value(value: &str) -> &str {
    if is_error_marker(value) || value == PENDING_SENTINEL {
        ""
    } else {
        value
    }
}

// =============================================================================
// Metadata Store
// =============================================================================

/// Maps records onto a file's metadata tags through a [`TagBackend`]
#[derive(Clone)]
pub struct MetadataStore {
    backend: Arc<dyn TagBackend>,
    policy: CachePolicy,
    encoding: TextEncoding,
}

impl MetadataStore {
    pub fn new(backend: Arc<dyn TagBackend>, policy: CachePolicy, encoding: TextEncoding) -> Self {
        Self {
            backend,
            policy,
            encoding,
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Reads the stored AI fields. Never fails: an unreadable file or a
    /// missing tool yields empty fields.
    pub fn read(&self, path: &Path, kind: MediaKind) -> AiFields {
        let Some(map) = field_map(kind) else {
            return AiFields::default();
        };

        let values = match self.backend.read_tags(path, &map.all_tags()) {
            Ok(values) => values,
            Err(e) => {
                warn!(
                    "Could not read metadata of {} via {}: {}",
                    path.display(),
                    self.backend.name(),
                    e
                );
                return AiFields::default();
            }
        };

        let (address, landmark) = AiFields::split_location(&first_non_empty(&values, map.location));
        let persons = first_non_empty(&values, map.persons)
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();

        AiFields {
            address,
            landmark,
            caption: first_non_empty(&values, map.caption),
            transcript: first_non_empty(&values, map.transcript),
            persons,
        }
    }

    /// Writes the AI fields into every storage location of the medium.
    ///
    /// File times are preserved and the tool's backup copy is removed once
    /// both copies are confirmed non-empty.
    pub fn write(&self, path: &Path, kind: MediaKind, fields: &AiFields) -> CoreResult<()> {
        let map = field_map(kind).ok_or(CoreError::UnsupportedKind {
            kind,
            operation: "metadata write",
        })?;

        let fields = fields.sanitized();
        let location = fields.location_text();
        let persons = fields.persons.join(", ");

        self.encoding.validate("address", &location)?;
        self.encoding.validate("caption", &fields.caption)?;
        self.encoding.validate("transcript", &fields.transcript)?;
        self.encoding.validate("persons", &persons)?;

        let mut values = Vec::new();
        push_all(&mut values, map.location, &location);
        push_all(&mut values, map.caption, &fields.caption);
        push_all(&mut values, map.transcript, &fields.transcript);
        push_all(&mut values, map.persons, &persons);

        self.apply(path, &values)
    }

    /// Clears the AI fields. Person names are left untouched.
    pub fn delete(&self, path: &Path, kind: MediaKind) -> CoreResult<()> {
        let map = field_map(kind).ok_or(CoreError::UnsupportedKind {
            kind,
            operation: "metadata delete",
        })?;

        let mut values = Vec::new();
        push_all(&mut values, map.location, "");
        push_all(&mut values, map.caption, "");
        push_all(&mut values, map.transcript, "");

        self.apply(path, &values)
    }

    fn apply(&self, path: &Path, values: &[(String, String)]) -> CoreResult<()> {
        if !path.exists() {
            return Err(CoreError::FileNotFound(path.display().to_string()));
        }
        if values.is_empty() {
            return Ok(());
        }

        let snapshot = TimestampSnapshot::capture(path)?;

        self.backend
            .write_tags(path, values)
            .map_err(|e| CoreError::MetadataWriteFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        if let Err(e) = snapshot.restore(path) {
            warn!("Could not restore file times of {}: {}", path.display(), e);
        }
        if let Err(e) = cleanup_tool_backup(path) {
            warn!("Could not clean up metadata backup of {}: {}", path.display(), e);
        }

        debug!("Wrote {} metadata tags to {}", values.len(), path.display());
        Ok(())
    }
}

fn push_all(values: &mut Vec<(String, String)>, tags: &[&str], value: &str) {
    values.extend(tags.iter().map(|tag| (tag.to_string(), value.to_string())));
}
