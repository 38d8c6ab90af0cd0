//! Annotation Data Models
//!
//! The per-file record owned by the orchestrator and its status machine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::assets::StructuralMetadata;
use crate::core::{MediaKind, RecordId, TimeSec};

use super::store::{AiFields, CachePolicy};

// =============================================================================
// Markers
// =============================================================================

/// Placeholder transcript while a job is queued or running
pub const PENDING_SENTINEL: &str = "...";

/// Prefix of every visible error value placed in a text field
pub const ERROR_MARKER: &str = "⚠️ ERROR";

/// Builds a visible error value for a text field
pub fn error_marker(message: &str) -> String {
    format!("{}: {}", ERROR_MARKER, message)
}

/// Whether a field value is an error marker rather than computed text
pub fn is_error_marker(value: &str) -> bool {
    value.trim_start().starts_with(ERROR_MARKER)
}

// =============================================================================
// Record Status
// =============================================================================

/// Processing state of a record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum RecordStatus {
    #[default]
    Pending,
    CaptionReady,
    TranscriptPending,
    Complete,
    Failed,
}

impl RecordStatus {
    fn rank(&self) -> u8 {
        match self {
            RecordStatus::Pending => 0,
            RecordStatus::CaptionReady => 1,
            RecordStatus::TranscriptPending => 2,
            RecordStatus::Complete => 3,
            RecordStatus::Failed => 3,
        }
    }

    /// Complete and Failed accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordStatus::Complete | RecordStatus::Failed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::CaptionReady => "caption-ready",
            RecordStatus::TranscriptPending => "transcript-pending",
            RecordStatus::Complete => "complete",
            RecordStatus::Failed => "failed",
        }
    }
}

// =============================================================================
// Media Record
// =============================================================================

/// One discovered file and everything learned about it during a run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    pub id: RecordId,
    pub path: PathBuf,
    pub kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length_seconds: Option<TimeSec>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub landmark: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub persons: Vec<String>,
    pub status: RecordStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MediaRecord {
    pub fn new(id: RecordId, path: PathBuf, kind: MediaKind) -> Self {
        Self {
            id,
            path,
            kind,
            date: None,
            latitude: None,
            longitude: None,
            length_seconds: None,
            address: String::new(),
            landmark: String::new(),
            caption: String::new(),
            transcript: String::new(),
            persons: Vec::new(),
            status: RecordStatus::Pending,
            error: None,
        }
    }

    /// Moves the status forward. Backward moves and moves out of a terminal
    /// state are ignored; returns whether the status changed.
    pub fn advance(&mut self, next: RecordStatus) -> bool {
        if self.status.is_terminal() || self.status == next {
            return false;
        }
        if next != RecordStatus::Failed && next.rank() < self.status.rank() {
            return false;
        }
        self.status = next;
        true
    }

    /// Marks the record failed, keeping whatever was already computed
    pub fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.advance(RecordStatus::Failed);
    }

    /// Copies probe results into fields that are still unset
    pub fn apply_structural(&mut self, meta: StructuralMetadata) {
        let coords = meta.coordinates();
        let StructuralMetadata {
            date,
            length_seconds,
            ..
        } = meta;

        if self.date.is_none() {
            self.date = date;
        }
        if self.latitude.is_none() && self.longitude.is_none() {
            if let Some((lat, lon)) = coords {
                self.latitude = Some(lat);
                self.longitude = Some(lon);
            }
        }
        if self.length_seconds.is_none() {
            self.length_seconds = length_seconds;
        }
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    /// Stores a transcript unless a computed one is already present.
    /// Returns whether the value was taken.
    pub fn set_transcript(&mut self, text: String, policy: &CachePolicy) -> bool {
        if policy.is_computed(&self.transcript) {
            return false;
        }
        self.transcript = text;
        true
    }

    pub fn transcript_pending(&self) -> bool {
        self.transcript == PENDING_SENTINEL
    }

    /// The fields persisted into the file's metadata
    pub fn ai_fields(&self) -> AiFields {
        AiFields {
            address: self.address.clone(),
            landmark: self.landmark.clone(),
            caption: self.caption.clone(),
            transcript: if self.transcript_pending() {
                String::new()
            } else {
                self.transcript.clone()
            },
            persons: self.persons.clone(),
        }
    }

    /// File name for log lines
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}
