//! Visual Description
//!
//! Turns an image, a video's sampled frames or an audio file's cover art
//! into caption text, and names the known people seen on the way.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::fs::{cover_path, frame_path};
use crate::core::{format_mmss, CoreError, CoreResult, MediaKind, TimeSec};

use super::provider::{FrameSource, ImageCaptioner, PersonIdentifier};

/// Separator between the timestamped captions of a video
pub const CAPTION_SEPARATOR: &str = " | ";

/// Sample times `0, i, 2i, ...` strictly below `duration`
pub fn frame_times(duration: TimeSec, interval: TimeSec) -> Vec<TimeSec> {
    if !duration.is_finite() || duration <= 0.0 {
        return Vec::new();
    }
    if !interval.is_finite() || interval <= 0.0 {
        return vec![0.0];
    }
    let count = (duration / interval).ceil() as usize;
    (0..count)
        .map(|i| i as f64 * interval)
        .filter(|t| *t < duration)
        .collect()
}

/// Uppercases the first character and lowercases the rest
pub fn capitalize(text: &str) -> String {
    let trimmed = text.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Accumulates `mm:ss caption` entries, dropping a caption equal to the
/// one right before it.
#[derive(Debug, Default)]
pub struct CaptionSequence {
    entries: Vec<String>,
    last: Option<String>,
}

impl CaptionSequence {
    pub fn push(&mut self, time_sec: TimeSec, caption: &str) {
        if self.last.as_deref() != Some(caption) {
            self.entries.push(format!("{} {}", format_mmss(time_sec), caption));
        }
        self.last = Some(caption.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn join(&self) -> String {
        self.entries.join(CAPTION_SEPARATOR).trim().to_string()
    }
}

// =============================================================================
// Describer
// =============================================================================

/// Caption text plus the people identified in the same images
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Description {
    pub caption: String,
    pub persons: Vec<String>,
}

/// Runs the captioning collaborator on whatever still image a medium offers
pub struct Describer {
    captioner: Arc<dyn ImageCaptioner>,
    frames: Arc<dyn FrameSource>,
    persons: Option<Arc<dyn PersonIdentifier>>,
    frame_interval: TimeSec,
    keep_frames: bool,
}

impl Describer {
    pub fn new(
        captioner: Arc<dyn ImageCaptioner>,
        frames: Arc<dyn FrameSource>,
        frame_interval: TimeSec,
        keep_frames: bool,
    ) -> Self {
        Self {
            captioner,
            frames,
            persons: None,
            frame_interval,
            keep_frames,
        }
    }

    /// Also identifies people in images and sampled frames
    pub fn with_persons(mut self, persons: Arc<dyn PersonIdentifier>) -> Self {
        self.persons = Some(persons);
        self
    }

    /// Captions the medium. With `identify`, the images looked at are also
    /// checked for known people; audio covers never are.
    pub async fn describe(
        &self,
        path: &Path,
        kind: MediaKind,
        length_seconds: Option<TimeSec>,
        identify: bool,
    ) -> CoreResult<Description> {
        let identify = identify && self.persons.is_some();
        let mut persons = Vec::new();
        let caption = match kind {
            MediaKind::Image => self.describe_image(path, identify, &mut persons).await?,
            MediaKind::Video => {
                self.describe_video(path, length_seconds, identify, &mut persons)
                    .await?
            }
            MediaKind::Audio => self.describe_audio(path).await?,
            MediaKind::Unknown => {
                return Err(CoreError::UnsupportedKind {
                    kind,
                    operation: "captioning",
                })
            }
        };
        Ok(Description { caption, persons })
    }

    async fn identify_into(&self, image: &Path, found: &mut Vec<String>) {
        let Some(identifier) = &self.persons else {
            return;
        };
        match identifier.identify(image).await {
            Ok(names) => {
                for name in names {
                    if !found.contains(&name) {
                        found.push(name);
                    }
                }
            }
            Err(e) => warn!("Person identification on {} failed: {}", image.display(), e),
        }
    }

    async fn describe_image(
        &self,
        path: &Path,
        identify: bool,
        persons: &mut Vec<String>,
    ) -> CoreResult<String> {
        let caption = self.captioner.caption(path).await?;
        if identify {
            self.identify_into(path, persons).await;
        }
        Ok(capitalize(&caption))
    }

    async fn describe_video(
        &self,
        path: &Path,
        length_seconds: Option<TimeSec>,
        identify: bool,
        persons: &mut Vec<String>,
    ) -> CoreResult<String> {
        let duration = length_seconds.ok_or_else(|| {
            CoreError::FFprobeError(format!("Unknown duration for {}", path.display()))
        })?;
        let times = frame_times(duration, self.frame_interval);
        info!(
            "Describing video {} from {} frames",
            path.display(),
            times.len()
        );

        let mut sequence = CaptionSequence::default();
        let mut last_error = None;

        for t in times {
            let mmss = format_mmss(t);
            let frame = frame_path(path, &mmss);
            debug!("  Frame {}/{}", mmss, format_mmss(duration));

            let result = match self.frames.extract_frame(path, t, &frame).await {
                Ok(()) => {
                    if identify {
                        self.identify_into(&frame, persons).await;
                    }
                    self.captioner.caption(&frame).await
                }
                Err(e) => Err(e),
            };

            if !self.keep_frames && frame.exists() {
                if let Err(e) = std::fs::remove_file(&frame) {
                    warn!("Could not remove frame {}: {}", frame.display(), e);
                }
            }

            match result {
                Ok(caption) => sequence.push(t, &capitalize(&caption)),
                Err(e) => {
                    warn!("Frame {} of {} skipped: {}", mmss, path.display(), e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if sequence.is_empty() => Err(e),
            _ => Ok(sequence.join()),
        }
    }

    async fn describe_audio(&self, path: &Path) -> CoreResult<String> {
        let cover = cover_path(path);
        if !cover.exists() && !self.frames.extract_cover(path, &cover).await? {
            debug!("No cover art in {}", path.display());
            return Ok(String::new());
        }
        let caption = self.captioner.caption(&cover).await?;
        Ok(capitalize(&caption))
    }
}
