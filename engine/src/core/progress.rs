//! Run Progress
//!
//! Counts processed files and weights transcription progress by media
//! duration, since one long interview outweighs many short clips.

use serde::Serialize;
use tracing::info;

use crate::core::TimeSec;

/// Weight of a job whose duration is unknown
const UNKNOWN_LENGTH_WEIGHT: TimeSec = 1.0;

/// Point-in-time view of a run
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub files_done: usize,
    pub files_total: usize,
    pub transcribed_seconds: TimeSec,
    pub queued_seconds: TimeSec,
}

impl ProgressSnapshot {
    /// Overall completion in `0.0..=1.0`: the inline pass and the
    /// transcription backlog each count for half.
    pub fn fraction(&self) -> f64 {
        let files = if self.files_total == 0 {
            1.0
        } else {
            self.files_done as f64 / self.files_total as f64
        };
        let seconds = if self.queued_seconds <= 0.0 {
            1.0
        } else {
            self.transcribed_seconds / self.queued_seconds
        };
        ((files + seconds) / 2.0).clamp(0.0, 1.0)
    }
}

/// File counter plus duration-weighted transcription gauge
#[derive(Debug, Default)]
pub struct ProgressTracker {
    snapshot: ProgressSnapshot,
}

fn weight(length_seconds: Option<TimeSec>) -> TimeSec {
    match length_seconds {
        Some(len) if len.is_finite() && len > 0.0 => len,
        _ => UNKNOWN_LENGTH_WEIGHT,
    }
}

impl ProgressTracker {
    pub fn new(files_total: usize) -> Self {
        Self {
            snapshot: ProgressSnapshot {
                files_total,
                ..ProgressSnapshot::default()
            },
        }
    }

    pub fn file_done(&mut self, name: &str) {
        self.snapshot.files_done += 1;
        info!(
            "[{}/{}] {} ({:.0}%)",
            self.snapshot.files_done,
            self.snapshot.files_total,
            name,
            self.snapshot.fraction() * 100.0
        );
    }

    pub fn transcription_queued(&mut self, length_seconds: Option<TimeSec>) {
        self.snapshot.queued_seconds += weight(length_seconds);
    }

    pub fn transcription_done(&mut self, name: &str, length_seconds: Option<TimeSec>) {
        self.snapshot.transcribed_seconds += weight(length_seconds);
        info!(
            "Transcribed {} ({:.0}s of {:.0}s audio, {:.0}%)",
            name,
            self.snapshot.transcribed_seconds,
            self.snapshot.queued_seconds,
            self.snapshot.fraction() * 100.0
        );
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot
    }
}
