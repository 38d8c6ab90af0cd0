//! FFmpeg Runner Module
//!
//! Executes FFmpeg commands that pull still images out of media files.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;

use super::{FFmpegError, FFmpegResult};
use crate::core::annotations::FrameSource;
use crate::core::process::{configure_tokio_command, resolve_tool, tool_responds};
use crate::core::{CoreResult, TimeSec};

/// FFmpeg Runner for still-image extraction
#[derive(Clone, Debug)]
pub struct FFmpegRunner {
    ffmpeg_path: PathBuf,
}

impl Default for FFmpegRunner {
    fn default() -> Self {
        Self::new(resolve_tool(None, "ffmpeg"))
    }
}

impl FFmpegRunner {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    pub fn from_settings(configured: Option<&str>) -> Self {
        Self::new(resolve_tool(configured, "ffmpeg"))
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    /// Whether the binary starts and answers `-version`
    pub fn is_available(&self) -> bool {
        tool_responds(&self.ffmpeg_path, "-version")
    }

    fn check_paths(input: &Path, output: &Path) -> FFmpegResult<()> {
        if !input.exists() {
            return Err(FFmpegError::InvalidInput(input.display().to_string()));
        }
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    FFmpegError::OutputError(format!("Failed to create output directory: {}", e))
                })?;
            }
        }
        Ok(())
    }

    async fn run(&self, args: Vec<String>) -> FFmpegResult<std::process::Output> {
        let mut cmd = tokio::process::Command::new(&self.ffmpeg_path);
        configure_tokio_command(&mut cmd);
        cmd.args(["-hide_banner", "-nostdin", "-loglevel", "error"])
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    FFmpegError::NotFound
                } else {
                    FFmpegError::ProcessError(e)
                }
            })
    }

    /// Extract a single frame from a video file.
    /// `-ss` before `-i` seeks on keyframes, which is fast and close enough
    /// for captioning.
    pub async fn extract_frame(
        &self,
        input: &Path,
        time_sec: f64,
        output: &Path,
    ) -> FFmpegResult<()> {
        Self::check_paths(input, output)?;

        let result = self.run(frame_args(input, time_sec, output)).await?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(FFmpegError::ExecutionFailed(format!(
                "Frame extraction at {:.3}s failed: {}",
                time_sec,
                stderr.trim()
            )));
        }
        if !output.exists() {
            return Err(FFmpegError::ExecutionFailed(format!(
                "No frame at {:.3}s",
                time_sec
            )));
        }

        Ok(())
    }

    /// Writes the attached picture of an audio file. Returns `false` when
    /// the file has no video stream to take it from.
    pub async fn extract_cover(&self, input: &Path, output: &Path) -> FFmpegResult<bool> {
        Self::check_paths(input, output)?;

        let result = self.run(cover_args(input, output)).await?;
        if !result.status.success() {
            tracing::debug!(
                "No cover art in {}: {}",
                input.display(),
                String::from_utf8_lossy(&result.stderr).trim()
            );
            return Ok(false);
        }

        Ok(output.exists())
    }
}

fn frame_args(input: &Path, time_sec: f64, output: &Path) -> Vec<String> {
    vec![
        "-ss".to_string(),
        format!("{:.3}", time_sec.max(0.0)),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-frames:v".to_string(),
        "1".to_string(),
        "-q:v".to_string(),
        "2".to_string(),
        "-y".to_string(),
        output.to_string_lossy().to_string(),
    ]
}

fn cover_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-an".to_string(),
        "-map".to_string(),
        "0:v:0".to_string(),
        "-frames:v".to_string(),
        "1".to_string(),
        "-y".to_string(),
        output.to_string_lossy().to_string(),
    ]
}

#[async_trait]
impl FrameSource for FFmpegRunner {
    async fn extract_frame(&self, video: &Path, time_sec: TimeSec, output: &Path) -> CoreResult<()> {
        Ok(FFmpegRunner::extract_frame(self, video, time_sec, output).await?)
    }

    async fn extract_cover(&self, audio: &Path, output: &Path) -> CoreResult<bool> {
        Ok(FFmpegRunner::extract_cover(self, audio, output).await?)
    }
}
