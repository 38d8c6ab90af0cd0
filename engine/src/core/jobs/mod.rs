//! Job System Module
//!
//! Background transcription jobs and the worker pool that runs them.

mod worker;

pub use worker::*;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::{JobId, MediaKind, RecordId, TimeSec};

// =============================================================================
// Job Types
// =============================================================================

/// One transcription request, consumed exactly once by one worker
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionJob {
    /// Unique job ID
    pub id: JobId,
    /// Record the result belongs to
    pub record_id: RecordId,
    pub path: PathBuf,
    pub kind: MediaKind,
    /// Caption computed so far, written into the video sidecar
    pub caption_so_far: String,
    pub length_seconds: Option<TimeSec>,
    /// Creation timestamp
    pub created_at: String,
}

impl TranscriptionJob {
    /// Creates a new job
    pub fn new(
        record_id: RecordId,
        path: PathBuf,
        kind: MediaKind,
        caption_so_far: String,
        length_seconds: Option<TimeSec>,
    ) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            record_id,
            path,
            kind,
            caption_so_far,
            length_seconds,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// The only message a worker sends back to the owner of the record table
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionOutcome {
    pub job_id: JobId,
    pub record_id: RecordId,
    pub path: PathBuf,
    pub length_seconds: Option<TimeSec>,
    /// Transcript text or the failure message
    pub result: Result<String, String>,
    /// Sidecar transcript written for this job, if any
    pub sidecar: Option<PathBuf>,
    /// Completion timestamp
    pub completed_at: String,
}

impl TranscriptionOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_creation() {
        let job = TranscriptionJob::new(
            3,
            PathBuf::from("/media/c.mp3"),
            MediaKind::Audio,
            String::new(),
            Some(61.0),
        );

        assert!(!job.id.is_empty());
        assert_eq!(job.record_id, 3);
        assert_eq!(job.kind, MediaKind::Audio);
        assert!(chrono::DateTime::parse_from_rfc3339(&job.created_at).is_ok());
    }

    #[test]
    fn test_job_ids_are_unique() {
        let a = TranscriptionJob::new(0, PathBuf::from("a.mp3"), MediaKind::Audio, String::new(), None);
        let b = TranscriptionJob::new(0, PathBuf::from("a.mp3"), MediaKind::Audio, String::new(), None);
        assert_ne!(a.id, b.id);
    }
}
