//! Media Discovery
//!
//! Walks an input folder and returns the files worth classifying, in a
//! stable order so repeated runs visit files identically.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::{CoreError, CoreResult};

/// Returns files under `root` (or `root` itself when it is a file), sorted.
///
/// Hidden entries and the engine's own frame and cover PNGs are skipped.
pub fn discover_media(root: &Path) -> CoreResult<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    if !root.is_dir() {
        return Err(CoreError::FileNotFound(root.display().to_string()));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if is_generated_artifact(&path) {
            debug!("Skipping generated artifact {}", path.display());
            continue;
        }
        files.push(path);
    }

    Ok(files)
}

/// Renders `path` relative to `root` when possible
pub fn relative_display(path: &Path, root: &Path) -> String {
    let base = if root.is_file() {
        root.parent().unwrap_or(root)
    } else {
        root
    };
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}

/// Extracted frames (`name+01-20.png`) and covers (`name+cover.png`)
fn is_generated_artifact(path: &Path) -> bool {
    static ARTIFACT: OnceLock<Option<Regex>> = OnceLock::new();

    let is_png = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("png"))
        .unwrap_or(false);
    if !is_png {
        return false;
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    ARTIFACT
        .get_or_init(|| Regex::new(r"^.+\+(cover|\d{2,}-\d{2})$").ok())
        .as_ref()
        .map(|re| re.is_match(stem))
        .unwrap_or(false)
}
