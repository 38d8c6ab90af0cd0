//! ExifTool Backend
//!
//! [`TagBackend`] over the `exiftool` command-line program.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::core::process::{configure_std_command, resolve_tool, tool_responds};
use crate::core::{CoreError, CoreResult};

use super::store::TagBackend;

/// List separator used for both reading and writing multi-value tags
const LIST_SEPARATOR: &str = ", ";

/// `exiftool` subprocess backend
#[derive(Clone, Debug)]
pub struct ExifTool {
    path: PathBuf,
}

impl Default for ExifTool {
    fn default() -> Self {
        Self::new(resolve_tool(None, "exiftool"))
    }
}

impl ExifTool {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_settings(configured: Option<&str>) -> Self {
        Self::new(resolve_tool(configured, "exiftool"))
    }

    pub fn is_available(&self) -> bool {
        tool_responds(&self.path, "-ver")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.path);
        configure_std_command(&mut cmd);
        cmd.args(["-charset", "utf8", "-sep", LIST_SEPARATOR]);
        cmd
    }
}

impl TagBackend for ExifTool {
    fn name(&self) -> &str {
        "exiftool"
    }

    fn read_tags(&self, path: &Path, tags: &[&str]) -> CoreResult<HashMap<String, String>> {
        let mut cmd = self.command();
        cmd.args(["-json", "-G1"]);
        for tag in tags {
            cmd.arg(format!("-{}", tag));
        }
        cmd.arg(path);

        let output = cmd
            .stdin(Stdio::null())
            .output()
            .map_err(|e| CoreError::MetadataToolError(format!("Failed to run exiftool: {}", e)))?;

        if !output.status.success() {
            return Err(CoreError::MetadataToolError(format!(
                "exiftool exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_json_output(&String::from_utf8_lossy(&output.stdout), tags)
    }

    fn write_tags(&self, path: &Path, values: &[(String, String)]) -> CoreResult<()> {
        let mut cmd = self.command();
        // Keep going on minor warnings; the `_original` backup is cleaned up by the store
        cmd.arg("-m");
        for (tag, value) in values {
            cmd.arg(format!("-{}={}", tag, value));
        }
        cmd.arg(path);

        let output = cmd
            .stdin(Stdio::null())
            .output()
            .map_err(|e| CoreError::MetadataToolError(format!("Failed to run exiftool: {}", e)))?;

        if !output.status.success() {
            return Err(CoreError::MetadataToolError(format!(
                "exiftool exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        debug!(
            "exiftool: {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }
}

/// Maps `exiftool -json -G1` output onto the requested tag names.
///
/// Grouped requests (`XMP-dc:Description`) match their key exactly; bare
/// requests (`Comment`) match any group.
pub fn parse_json_output(stdout: &str, requested: &[&str]) -> CoreResult<HashMap<String, String>> {
    let parsed: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(stdout)
        .map_err(|e| CoreError::MetadataToolError(format!("Unreadable exiftool output: {}", e)))?;

    let mut result = HashMap::new();
    let Some(object) = parsed.into_iter().next() else {
        return Ok(result);
    };

    for tag in requested {
        let found = if tag.contains(':') {
            object.get(*tag)
        } else {
            let suffix = format!(":{}", tag);
            object
                .iter()
                .find(|(key, _)| key.as_str() == *tag || key.ends_with(&suffix))
                .map(|(_, value)| value)
        };

        if let Some(value) = found.and_then(value_to_string) {
            result.insert(tag.to_string(), value);
        }
    }

    Ok(result)
}

fn value_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Array(items) => Some(
            items
                .iter()
                .filter_map(value_to_string)
                .collect::<Vec<_>>()
                .join(LIST_SEPARATOR),
        ),
        _ => None,
    }
}
