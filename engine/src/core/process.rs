//! External tool invocation helpers.
//!
//! ffmpeg, ffprobe and exiftool are console binaries. On Windows each spawn
//! would flash a console window unless `CREATE_NO_WINDOW` is set, so every
//! command goes through the helpers below.

use std::path::{Path, PathBuf};

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Apply platform-specific flags to a std process command.
pub fn configure_std_command(cmd: &mut std::process::Command) {
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    #[cfg(not(target_os = "windows"))]
    let _ = cmd;
}

/// Apply platform-specific flags to a tokio process command.
pub fn configure_tokio_command(cmd: &mut tokio::process::Command) {
    #[cfg(target_os = "windows")]
    {
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    #[cfg(not(target_os = "windows"))]
    let _ = cmd;
}

/// Resolves a configured tool path, falling back to the bare binary name
/// so the OS looks it up on `PATH`.
pub fn resolve_tool(configured: Option<&str>, binary: &str) -> PathBuf {
    match configured.map(str::trim) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(platform_binary(binary)),
    }
}

/// Runs `<tool> <version_arg>` and reports whether it exited successfully
pub fn tool_responds(tool: &Path, version_arg: &str) -> bool {
    let mut cmd = std::process::Command::new(tool);
    configure_std_command(&mut cmd);
    cmd.arg(version_arg)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn platform_binary(binary: &str) -> String {
    if cfg!(target_os = "windows") && !binary.ends_with(".exe") {
        format!("{binary}.exe")
    } else {
        binary.to_string()
    }
}
