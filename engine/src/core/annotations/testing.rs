//! In-memory doubles for the collaborator traits, shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::assets::{MediaProbe, StructuralMetadata};
use crate::core::fs::tool_backup_path;
use crate::core::geo::{GeoPlace, ReverseGeocoder};
use crate::core::{CoreError, CoreResult, MediaKind, TimeSec};

use super::provider::{FrameSource, ImageCaptioner, PersonIdentifier, Transcriber};
use super::store::TagBackend;

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

// =============================================================================
// Metadata Tags
// =============================================================================

/// Tag storage keyed by file path. Writes touch the file like a real tool
/// would, optionally leaving an `_original` backup behind.
#[derive(Default)]
pub struct MemoryTags {
    values: Mutex<HashMap<PathBuf, HashMap<String, String>>>,
    fail_reads: AtomicBool,
    emit_backups: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryTags {
    pub fn get(&self, path: &Path, tag: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap()
            .get(path)
            .and_then(|tags| tags.get(tag).cloned())
    }

    pub fn set(&self, path: &Path, tag: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .entry(path.to_path_buf())
            .or_default()
            .insert(tag.to_string(), value.to_string());
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn emit_backups(&self, emit: bool) {
        self.emit_backups.store(emit, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl TagBackend for MemoryTags {
    fn name(&self) -> &str {
        "memory"
    }

    fn read_tags(&self, path: &Path, tags: &[&str]) -> CoreResult<HashMap<String, String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CoreError::MetadataToolError("tool unavailable".to_string()));
        }
        let values = self.values.lock().unwrap();
        Ok(values
            .get(path)
            .map(|stored| {
                tags.iter()
                    .filter_map(|t| stored.get(*t).map(|v| (t.to_string(), v.clone())))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn write_tags(&self, path: &Path, values: &[(String, String)]) -> CoreResult<()> {
        let bytes = std::fs::read(path)?;
        if self.emit_backups.load(Ordering::SeqCst) {
            std::fs::write(tool_backup_path(path), &bytes)?;
        }
        std::fs::write(path, &bytes)?;

        let mut stored = self.values.lock().unwrap();
        let tags = stored.entry(path.to_path_buf()).or_default();
        for (tag, value) in values {
            tags.insert(tag.clone(), value.clone());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Captioner
// =============================================================================

/// Returns captions from a fixed sequence, repeating the last one
pub struct CountingCaptioner {
    captions: Vec<String>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl CountingCaptioner {
    pub fn with_sequence(captions: Vec<&str>) -> Self {
        Self {
            captions: captions.into_iter().map(str::to_string).collect(),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn fixed(caption: &str) -> Self {
        Self::with_sequence(vec![caption])
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageCaptioner for CountingCaptioner {
    fn name(&self) -> &str {
        "counting"
    }

    async fn caption(&self, _image: &Path) -> CoreResult<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CoreError::CaptionFailed("model offline".to_string()));
        }
        let idx = n.min(self.captions.len().saturating_sub(1));
        Ok(self.captions.get(idx).cloned().unwrap_or_default())
    }
}

// =============================================================================
// Persons
// =============================================================================

/// Answers fixed names per image file name
#[derive(Default)]
pub struct StubPersons {
    names: HashMap<String, Vec<String>>,
    failing: bool,
    calls: AtomicUsize,
}

impl StubPersons {
    pub fn with(mut self, image: &str, names: &[&str]) -> Self {
        self.names
            .insert(image.to_string(), names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersonIdentifier for StubPersons {
    fn name(&self) -> &str {
        "stub"
    }

    async fn identify(&self, image: &Path) -> CoreResult<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(CoreError::PersonIdentificationFailed("no faces model".to_string()));
        }
        Ok(self.names.get(&file_name(image)).cloned().unwrap_or_default())
    }
}

// =============================================================================
// Transcriber
// =============================================================================

/// Answers `transcript of <file name>`, recording call order
#[derive(Default)]
pub struct CountingTranscriber {
    delay: Option<Duration>,
    failing: HashSet<String>,
    order: Mutex<Vec<PathBuf>>,
}

impl CountingTranscriber {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn failing_on(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.order.lock().unwrap().len()
    }

    pub fn order(&self) -> Vec<PathBuf> {
        self.order.lock().unwrap().clone()
    }
}

impl Transcriber for CountingTranscriber {
    fn name(&self) -> &str {
        "counting"
    }

    fn transcribe(&self, path: &Path, _kind: MediaKind) -> CoreResult<String> {
        self.order.lock().unwrap().push(path.to_path_buf());
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let name = file_name(path);
        if self.failing.contains(&name) {
            return Err(CoreError::TranscriptionFailed(format!("cannot decode {}", name)));
        }
        Ok(format!("transcript of {}", name))
    }
}

// =============================================================================
// Frames
// =============================================================================

/// Writes placeholder PNG bytes wherever a frame or cover is requested
#[derive(Default)]
pub struct StubFrames {
    has_cover: AtomicBool,
    frame_calls: AtomicUsize,
    cover_calls: AtomicUsize,
}

impl StubFrames {
    pub fn with_cover() -> Self {
        let frames = Self::default();
        frames.has_cover.store(true, Ordering::SeqCst);
        frames
    }

    pub fn frame_calls(&self) -> usize {
        self.frame_calls.load(Ordering::SeqCst)
    }

    pub fn cover_calls(&self) -> usize {
        self.cover_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameSource for StubFrames {
    async fn extract_frame(&self, _video: &Path, _time_sec: TimeSec, output: &Path) -> CoreResult<()> {
        self.frame_calls.fetch_add(1, Ordering::SeqCst);
        std::fs::write(output, b"png")?;
        Ok(())
    }

    async fn extract_cover(&self, _audio: &Path, output: &Path) -> CoreResult<bool> {
        self.cover_calls.fetch_add(1, Ordering::SeqCst);
        if !self.has_cover.load(Ordering::SeqCst) {
            return Ok(false);
        }
        std::fs::write(output, b"png")?;
        Ok(true)
    }
}

// =============================================================================
// Probe
// =============================================================================

/// Structural metadata keyed by file name
#[derive(Default)]
pub struct StubProbe {
    entries: HashMap<String, StructuralMetadata>,
    failing: HashSet<String>,
}

impl StubProbe {
    pub fn with(mut self, name: &str, meta: StructuralMetadata) -> Self {
        self.entries.insert(name.to_string(), meta);
        self
    }

    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }
}

impl MediaProbe for StubProbe {
    fn probe(&self, path: &Path, _kind: MediaKind) -> CoreResult<StructuralMetadata> {
        let name = file_name(path);
        if self.failing.contains(&name) {
            return Err(CoreError::FFprobeError(format!("unreadable {}", name)));
        }
        Ok(self.entries.get(&name).cloned().unwrap_or_default())
    }
}

// =============================================================================
// Geocoder
// =============================================================================

/// Answers every position with the same place
pub struct StubGeocoder {
    place: GeoPlace,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl StubGeocoder {
    pub fn new(address: &str, landmark: Option<&str>) -> Self {
        Self {
            place: GeoPlace {
                address: address.to_string(),
                landmark: landmark.map(str::to_string),
            },
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReverseGeocoder for StubGeocoder {
    fn name(&self) -> &str {
        "stub"
    }

    async fn reverse(&self, _latitude: f64, _longitude: f64) -> CoreResult<GeoPlace> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CoreError::GeocodeFailed("offline".to_string()));
        }
        Ok(self.place.clone())
    }
}
