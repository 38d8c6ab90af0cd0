//! Filesystem utilities.
//!
//! Crash-tolerant writes for settings, exports and sidecars, plus the
//! helpers that keep a media file's timestamps and the metadata tool's
//! backup copies under control.

use std::fs::{File, FileTimes, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::core::{CoreError, CoreResult};

/// Suffix the metadata tool appends to the untouched copy of a rewritten file
pub const TOOL_BACKUP_SUFFIX: &str = "_original";

// =============================================================================
// Atomic Writes
// =============================================================================

/// Write bytes to `path` using an atomic replace pattern.
///
/// Implementation notes:
/// - Write to a sibling temporary file.
/// - Flush and sync the temp file.
/// - Swap into place by renaming.
/// - If the destination exists, it is first moved aside as a `.bak` file, then removed.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = sibling_with_suffix(path, ".tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    atomic_replace(path, &tmp_path)
}

/// Write a JSON file atomically with pretty formatting.
pub fn atomic_write_json_pretty<T: serde::Serialize>(path: &Path, value: &T) -> CoreResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &bytes)
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    path.with_file_name(format!("{file_name}{suffix}"))
}

fn atomic_replace(dest: &Path, src_tmp: &Path) -> CoreResult<()> {
    if !dest.exists() {
        std::fs::rename(src_tmp, dest)?;
        return Ok(());
    }

    // Windows: rename-over-existing may fail depending on filesystem; use a backup swap.
    let bak = sibling_with_suffix(dest, ".bak");
    if bak.exists() {
        let _ = std::fs::remove_file(&bak);
    }

    std::fs::rename(dest, &bak)?;
    match std::fs::rename(src_tmp, dest) {
        Ok(()) => {
            let _ = std::fs::remove_file(&bak);
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::rename(&bak, dest);
            let _ = std::fs::remove_file(src_tmp);
            Err(CoreError::IoError(e))
        }
    }
}

// =============================================================================
// Timestamp Preservation
// =============================================================================

/// Access and modification times of a file, captured before a rewrite
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimestampSnapshot {
    pub accessed: SystemTime,
    pub modified: SystemTime,
}

impl TimestampSnapshot {
    pub fn capture(path: &Path) -> CoreResult<Self> {
        let meta = std::fs::metadata(path)?;
        let modified = meta.modified()?;
        // Some filesystems do not track access time
        let accessed = meta.accessed().unwrap_or(modified);
        Ok(Self { accessed, modified })
    }

    /// Puts the captured times back on `path`
    pub fn restore(&self, path: &Path) -> CoreResult<()> {
        let file = OpenOptions::new().write(true).open(path)?;
        let times = FileTimes::new()
            .set_accessed(self.accessed)
            .set_modified(self.modified);
        file.set_times(times)?;
        Ok(())
    }
}

// =============================================================================
// Metadata Tool Backups
// =============================================================================

/// Outcome of [`cleanup_tool_backup`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackupCleanup {
    /// Both copies were non-empty; the backup was deleted
    Removed,
    /// No backup was written
    Missing,
    /// The rewritten file or the backup looked truncated; the backup stays
    Kept,
}

/// `<file>_original` for `<file>`
pub fn tool_backup_path(path: &Path) -> PathBuf {
    sibling_with_suffix(path, TOOL_BACKUP_SUFFIX)
}

/// Removes the metadata tool's backup only when both the rewritten file and
/// the backup are confirmed non-empty.
pub fn cleanup_tool_backup(path: &Path) -> CoreResult<BackupCleanup> {
    let backup = tool_backup_path(path);
    let backup_len = match std::fs::metadata(&backup) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BackupCleanup::Missing),
        Err(e) => return Err(e.into()),
    };
    let file_len = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    if file_len > 0 && backup_len > 0 {
        std::fs::remove_file(&backup)?;
        debug!("Removed metadata backup {}", backup.display());
        Ok(BackupCleanup::Removed)
    } else {
        warn!(
            "Keeping metadata backup {} (file {} bytes, backup {} bytes)",
            backup.display(),
            file_len,
            backup_len
        );
        Ok(BackupCleanup::Kept)
    }
}

// =============================================================================
// Sidecar Paths
// =============================================================================

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// `<file>.txt` next to an audio file
pub fn audio_transcript_path(path: &Path) -> PathBuf {
    sibling_with_suffix(path, ".txt")
}

/// `<stem>_transkript.txt` next to a video file
pub fn video_transcript_path(path: &Path) -> PathBuf {
    path.with_file_name(format!("{}_transkript.txt", stem_of(path)))
}

/// `<stem>+<mm-ss>.png` for a frame sampled at `mmss` (`mm:ss`)
pub fn frame_path(path: &Path, mmss: &str) -> PathBuf {
    path.with_file_name(format!("{}+{}.png", stem_of(path), mmss.replace(':', "-")))
}

/// `<stem>+cover.png` for an audio file's embedded cover
pub fn cover_path(path: &Path) -> PathBuf {
    path.with_file_name(format!("{}+cover.png", stem_of(path)))
}
