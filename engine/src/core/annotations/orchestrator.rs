//! Annotation Orchestrator
//!
//! Drives every discovered file through the annotation pipeline:
//! classify, probe, read cached fields, caption inline, geocode, hand
//! transcription to the background pool, persist, and finally wait for
//! the pool to drain.
//!
//! The record table lives on the control task only. Workers report back
//! through [`TranscriptionOutcome`] messages that are applied between
//! files and after the drain.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::assets::{classify, MediaProbe, MetadataExtractor};
use crate::core::ffmpeg::FFmpegRunner;
use crate::core::geo::{GeoResolver, NominatimGeocoder, ReverseGeocoder};
use crate::core::jobs::{
    SchedulerConfig, TranscriptionJob, TranscriptionOutcome, TranscriptionScheduler,
};
use crate::core::process::resolve_tool;
use crate::core::progress::ProgressTracker;
use crate::core::settings::AnalyzerSettings;
use crate::core::transcription::load_transcriber;
use crate::core::{CoreError, CoreResult, MediaKind};

use super::describe::Describer;
use super::exiftool::ExifTool;
use super::models::{error_marker, MediaRecord, RecordStatus, PENDING_SENTINEL};
use super::provider::{FrameSource, ImageCaptioner, PersonIdentifier, Transcriber};
use super::providers::{OllamaCaptioner, OllamaPersonIdentifier};
use super::store::{AiFields, CachePolicy, MetadataStore, TagBackend, TextEncoding};

// =============================================================================
// Collaborators
// =============================================================================

/// Everything the orchestrator talks to, injected as trait objects
pub struct Collaborators {
    pub tags: Arc<dyn TagBackend>,
    pub probe: Arc<dyn MediaProbe>,
    pub captioner: Arc<dyn ImageCaptioner>,
    pub frames: Arc<dyn FrameSource>,
    pub transcriber: Arc<dyn Transcriber>,
    /// `None` disables person identification
    pub persons: Option<Arc<dyn PersonIdentifier>>,
    /// `None` disables reverse geocoding
    pub geocoder: Option<Arc<dyn ReverseGeocoder>>,
}

impl Collaborators {
    /// Builds the shipped adapters from settings
    pub fn from_settings(settings: &AnalyzerSettings) -> CoreResult<Self> {
        let geocoder: Option<Arc<dyn ReverseGeocoder>> = if settings.geo.enabled {
            Some(Arc::new(NominatimGeocoder::new(&settings.geo)?))
        } else {
            None
        };
        let persons: Option<Arc<dyn PersonIdentifier>> = if settings.persons.enabled {
            let faces_dir = settings.persons.faces_dir.as_deref().ok_or_else(|| {
                CoreError::InvalidConfig("persons.facesDir is not set".to_string())
            })?;
            Some(Arc::new(OllamaPersonIdentifier::new(
                &settings.captioning,
                Path::new(faces_dir),
            )?))
        } else {
            None
        };

        Ok(Self {
            tags: Arc::new(ExifTool::from_settings(settings.tools.exiftool_path.as_deref())),
            probe: Arc::new(MetadataExtractor::new(resolve_tool(
                settings.tools.ffprobe_path.as_deref(),
                "ffprobe",
            ))),
            captioner: Arc::new(OllamaCaptioner::new(&settings.captioning)?),
            frames: Arc::new(FFmpegRunner::from_settings(
                settings.tools.ffmpeg_path.as_deref(),
            )),
            transcriber: Arc::from(load_transcriber(settings)),
            persons,
            geocoder,
        })
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct AnnotationOrchestrator {
    store: MetadataStore,
    probe: Arc<dyn MediaProbe>,
    describer: Describer,
    geo: Option<GeoResolver>,
    scheduler: TranscriptionScheduler,
    updates: mpsc::UnboundedReceiver<TranscriptionOutcome>,
    /// Indexed by `RecordId`
    records: Vec<MediaRecord>,
    /// Fields as last read from or written to each file
    baseline: Vec<AiFields>,
    progress: ProgressTracker,
    merge_landmark: bool,
}

impl AnnotationOrchestrator {
    /// Wires the collaborators and starts the transcription pool. Must be
    /// called inside a tokio runtime.
    pub fn new(collaborators: Collaborators, settings: &AnalyzerSettings) -> CoreResult<Self> {
        let encoding: TextEncoding = settings.metadata.encoding.parse()?;
        let policy = CachePolicy::new(settings.analysis.min_cached_chars);

        let mut describer = Describer::new(
            collaborators.captioner,
            collaborators.frames,
            settings.analysis.frame_interval_secs,
            settings.analysis.keep_frames,
        );
        if let Some(persons) = collaborators.persons {
            describer = describer.with_persons(persons);
        }
        let geo = collaborators.geocoder.map(|geocoder| {
            GeoResolver::new(
                geocoder,
                settings.geo.cache_capacity,
                settings.geo.precision,
            )
        });
        let (scheduler, updates) = TranscriptionScheduler::start(
            collaborators.transcriber,
            SchedulerConfig::from_settings(&settings.transcription),
        );

        Ok(Self {
            store: MetadataStore::new(collaborators.tags, policy, encoding),
            probe: collaborators.probe,
            describer,
            geo,
            scheduler,
            updates,
            records: Vec::new(),
            baseline: Vec::new(),
            progress: ProgressTracker::default(),
            merge_landmark: settings.analysis.merge_landmark_into_caption,
        })
    }

    /// Builds the orchestrator on the shipped adapters
    pub fn from_settings(settings: &AnalyzerSettings) -> CoreResult<Self> {
        Self::new(Collaborators::from_settings(settings)?, settings)
    }

    /// Annotates `files` and returns one record per supported file, in
    /// input order. Returns only after every transcription has been applied.
    pub async fn run(mut self, files: Vec<PathBuf>) -> Vec<MediaRecord> {
        info!("Annotating {} file(s)", files.len());
        self.progress = ProgressTracker::new(files.len());

        for path in files {
            let name = file_label(&path);
            self.process_file(path).await;
            self.progress.file_done(&name);
            self.apply_updates().await;
        }

        let pending = self.scheduler.in_flight();
        if pending > 0 {
            info!("Waiting for {} transcription job(s)", pending);
        }
        self.scheduler.drain().await;
        self.apply_updates().await;
        self.finalize();

        let snapshot = self.progress.snapshot();
        let failed = self
            .records
            .iter()
            .filter(|r| r.status == RecordStatus::Failed)
            .count();
        info!(
            "Annotation finished: {} record(s), {} failed, {:.0}s transcribed",
            self.records.len(),
            failed,
            snapshot.transcribed_seconds
        );

        let records = self.records;
        self.scheduler.shutdown().await;
        records
    }

    // -------------------------------------------------------------------------
    // Inline pass
    // -------------------------------------------------------------------------

    async fn process_file(&mut self, path: PathBuf) {
        let kind = classify(&path);
        if !kind.is_known() {
            debug!("Skipping {}: unsupported file type", path.display());
            return;
        }

        let mut record = MediaRecord::new(self.records.len(), path, kind);

        let probe = Arc::clone(&self.probe);
        let probe_path = record.path.clone();
        match run_blocking(move || probe.probe(&probe_path, kind)).await {
            Ok(meta) => record.apply_structural(meta),
            Err(e) => warn!(
                "Structural metadata of {} unavailable: {}",
                record.display_name(),
                e
            ),
        }

        let store = self.store.clone();
        let read_path = record.path.clone();
        let stored = run_blocking(move || Ok(store.read(&read_path, kind)))
            .await
            .unwrap_or_default();
        self.baseline.push(stored.clone());

        if let Err(e) = self.annotate(&mut record, &stored).await {
            error!("Annotating {} failed: {}", record.display_name(), e);
            record.fail(e.to_string());
        }
        self.records.push(record);
    }

    async fn annotate(&mut self, record: &mut MediaRecord, stored: &AiFields) -> CoreResult<()> {
        let policy = *self.store.policy();

        if policy.is_located(&stored.address, &stored.landmark) {
            record.address = stored.address.clone();
            record.landmark = stored.landmark.clone();
        }
        record.caption = policy.keep_computed(stored.caption.clone());
        record.transcript = policy.keep_computed(stored.transcript.clone());
        record.persons = stored.persons.clone();

        let mut fresh_caption = false;
        if policy.is_computed(&record.caption) {
            debug!("Cached caption for {}", record.display_name());
        } else {
            // People are looked for in the images sampled for the caption
            let identify = record.persons.is_empty();
            match self
                .describer
                .describe(&record.path, record.kind, record.length_seconds, identify)
                .await
            {
                Ok(description) => {
                    fresh_caption = !description.caption.is_empty();
                    record.caption = description.caption;
                    if identify && !description.persons.is_empty() {
                        record.persons = description.persons;
                    }
                }
                Err(e) => {
                    warn!("Captioning {} failed: {}", record.display_name(), e);
                    record.caption = error_marker(&e.to_string());
                }
            }
        }
        record.advance(RecordStatus::CaptionReady);

        self.locate(record, fresh_caption).await;

        if record.kind.is_transcribable() && !policy.is_computed(&record.transcript) {
            record.transcript = PENDING_SENTINEL.to_string();
            record.advance(RecordStatus::TranscriptPending);

            let job = TranscriptionJob::new(
                record.id,
                record.path.clone(),
                record.kind,
                record.ai_fields().sanitized().caption,
                record.length_seconds,
            );
            self.scheduler.enqueue(job)?;
            self.progress.transcription_queued(record.length_seconds);
            return Ok(());
        }

        persist(&self.store, &mut self.baseline[record.id], record).await?;
        record.advance(RecordStatus::Complete);
        Ok(())
    }

    async fn locate(&self, record: &mut MediaRecord, fresh_caption: bool) {
        let Some(geo) = &self.geo else {
            return;
        };
        if !matches!(record.kind, MediaKind::Image | MediaKind::Video)
            || self
                .store
                .policy()
                .is_located(&record.address, &record.landmark)
        {
            return;
        }
        let Some((latitude, longitude)) = record.coordinates() else {
            return;
        };

        let Some(place) = geo.resolve(latitude, longitude).await else {
            return;
        };

        if fresh_caption && record.kind == MediaKind::Image && self.merge_landmark {
            record.caption = GeoResolver::merge_with_caption(&record.caption, place.landmark.as_deref());
        }
        record.address = place.address;
        record.landmark = place.landmark.unwrap_or_default();
    }

    // -------------------------------------------------------------------------
    // Outcomes
    // -------------------------------------------------------------------------

    async fn apply_updates(&mut self) {
        while let Ok(outcome) = self.updates.try_recv() {
            self.apply_outcome(outcome).await;
        }
    }

    async fn apply_outcome(&mut self, outcome: TranscriptionOutcome) {
        let id = outcome.record_id;
        if id >= self.records.len() {
            warn!(
                "Dropping transcription of {}: {}",
                outcome.path.display(),
                CoreError::RecordNotFound(id)
            );
            return;
        }

        let name = self.records[id].display_name();
        self.progress.transcription_done(&name, outcome.length_seconds);

        let policy = *self.store.policy();
        let record = &mut self.records[id];
        if record.status != RecordStatus::TranscriptPending {
            warn!(
                "Ignoring transcription of {}: record is {}",
                name,
                record.status.label()
            );
            return;
        }

        match outcome.result {
            Ok(text) => {
                if !record.set_transcript(text, &policy) {
                    debug!("Keeping existing transcript of {}", name);
                }
                match persist(&self.store, &mut self.baseline[id], record).await {
                    Ok(()) => {
                        record.advance(RecordStatus::Complete);
                    }
                    Err(e) => {
                        error!("Saving annotations of {} failed: {}", name, e);
                        record.fail(e.to_string());
                    }
                }
            }
            Err(message) => {
                record.transcript = error_marker(&message);
                if let Err(e) = persist(&self.store, &mut self.baseline[id], record).await {
                    warn!("Saving caption of {} failed: {}", name, e);
                }
                record.fail(message);
            }
        }
    }

    fn finalize(&mut self) {
        for record in &mut self.records {
            if record.status == RecordStatus::TranscriptPending {
                warn!("No transcription outcome for {}", record.display_name());
                record.fail("transcription outcome never arrived");
            } else if !record.status.is_terminal() {
                record.advance(RecordStatus::Complete);
            }
        }
    }
}

/// Writes the record's fields when they differ from what the file holds
async fn persist(
    store: &MetadataStore,
    baseline: &mut AiFields,
    record: &MediaRecord,
) -> CoreResult<()> {
    let fields = record.ai_fields().sanitized();
    if fields == *baseline {
        debug!("Metadata of {} unchanged", record.display_name());
        return Ok(());
    }

    let store = store.clone();
    let path = record.path.clone();
    let kind = record.kind;
    let to_write = fields.clone();
    run_blocking(move || store.write(&path, kind, &to_write)).await?;

    *baseline = fields;
    Ok(())
}

async fn run_blocking<T, F>(f: F) -> CoreResult<T>
where
    F: FnOnce() -> CoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CoreError::Internal(format!("Blocking task failed: {}", e)))?
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::annotations::is_error_marker;
    use crate::core::annotations::testing::{
        CountingCaptioner, CountingTranscriber, MemoryTags, StubFrames, StubGeocoder, StubPersons,
        StubProbe,
    };
    use crate::core::assets::StructuralMetadata;
    use crate::core::export::{export_records, ExportFormat};
    use tempfile::TempDir;

    struct Doubles {
        tags: Arc<MemoryTags>,
        captioner: Arc<CountingCaptioner>,
        transcriber: Arc<CountingTranscriber>,
        frames: Arc<StubFrames>,
        persons: Option<Arc<StubPersons>>,
        geocoder: Arc<StubGeocoder>,
    }

    impl Doubles {
        fn new() -> Self {
            Self {
                tags: Arc::new(MemoryTags::default()),
                captioner: Arc::new(CountingCaptioner::fixed("a person walking a dog")),
                transcriber: Arc::new(CountingTranscriber::default()),
                frames: Arc::new(StubFrames::default()),
                persons: None,
                geocoder: Arc::new(StubGeocoder::new(
                    "Avenue Anatole France, Paris, France",
                    Some("Eiffel Tower"),
                )),
            }
        }

        fn collaborators(&self, probe: StubProbe) -> Collaborators {
            Collaborators {
                tags: self.tags.clone(),
                probe: Arc::new(probe),
                captioner: self.captioner.clone(),
                frames: self.frames.clone(),
                transcriber: self.transcriber.clone(),
                persons: self
                    .persons
                    .clone()
                    .map(|p| p as Arc<dyn PersonIdentifier>),
                geocoder: Some(self.geocoder.clone()),
            }
        }
    }

    fn create_test_orchestrator(doubles: &Doubles, probe: StubProbe) -> AnnotationOrchestrator {
        AnnotationOrchestrator::new(doubles.collaborators(probe), &AnalyzerSettings::default())
            .unwrap()
    }

    fn create_media(dir: &TempDir, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|name| {
                let path = dir.path().join(name);
                std::fs::write(&path, b"media").unwrap();
                path
            })
            .collect()
    }

    fn example_probe() -> StubProbe {
        StubProbe::default()
            .with(
                "a.jpg",
                StructuralMetadata {
                    date: Some("2024-05-01 10:00:00".to_string()),
                    latitude: Some(48.8584),
                    longitude: Some(2.2945),
                    length_seconds: None,
                },
            )
            .with(
                "b.mp4",
                StructuralMetadata {
                    length_seconds: Some(120.0),
                    ..StructuralMetadata::default()
                },
            )
            .with(
                "c.mp3",
                StructuralMetadata {
                    length_seconds: Some(95.0),
                    ..StructuralMetadata::default()
                },
            )
    }

    // -------------------------------------------------------------------------
    // Pipeline Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_example_scenario() {
        let dir = TempDir::new().unwrap();
        let files = create_media(&dir, &["a.jpg", "b.mp4", "c.mp3"]);
        let doubles = Doubles::new();

        let records = create_test_orchestrator(&doubles, example_probe())
            .run(files.clone())
            .await;

        let kinds: Vec<MediaKind> = records.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![MediaKind::Image, MediaKind::Video, MediaKind::Audio]);
        assert!(records.iter().all(|r| r.status == RecordStatus::Complete));

        // one image caption plus twelve frames of the 120 s video
        assert_eq!(doubles.captioner.calls(), 13);
        assert_eq!(doubles.frames.frame_calls(), 12);
        assert_eq!(doubles.transcriber.order(), vec![files[1].clone(), files[2].clone()]);

        let image = &records[0];
        assert_eq!(image.address, "Avenue Anatole France, Paris, France");
        assert_eq!(image.landmark, "Eiffel Tower");
        assert_eq!(
            image.caption,
            "A person walking a dog The image was taken near Eiffel Tower."
        );
        assert!(image.transcript.is_empty());

        assert!(records[1].caption.starts_with("00:00 A person walking a dog"));
        assert_eq!(records[1].transcript, "transcript of b.mp4");
        assert!(records[2].caption.is_empty());
        assert_eq!(records[2].transcript, "transcript of c.mp3");

        assert_eq!(
            doubles.tags.get(&files[0], "XMP-iptcCore:Location").as_deref(),
            Some("Avenue Anatole France, Paris, France|Eiffel Tower")
        );
        assert_eq!(
            doubles.tags.get(&files[2], "Lyrics").as_deref(),
            Some("transcript of c.mp3")
        );

        // frames are cleaned up
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().map(|x| x == "png").unwrap_or(false))
            .count();
        assert_eq!(leftovers, 0);

        let output = dir.path().join("_media_analysis.csv");
        export_records(&records, dir.path(), ExportFormat::Csv, &output).unwrap();
        let csv = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("a.jpg;image;"));
        assert!(lines[1].contains("Avenue Anatole France, Paris, France"));
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let files = create_media(&dir, &["a.jpg", "b.mp4", "c.mp3"]);
        let doubles = Doubles::new();

        create_test_orchestrator(&doubles, example_probe())
            .run(files.clone())
            .await;
        let captions = doubles.captioner.calls();
        let transcriptions = doubles.transcriber.calls();
        let geocodes = doubles.geocoder.calls();
        let writes = doubles.tags.write_count();
        assert_eq!(writes, 3);

        let records = create_test_orchestrator(&doubles, example_probe())
            .run(files)
            .await;

        assert_eq!(doubles.captioner.calls(), captions);
        assert_eq!(doubles.transcriber.calls(), transcriptions);
        assert_eq!(doubles.geocoder.calls(), geocodes);
        assert_eq!(doubles.tags.write_count(), writes);
        assert!(records.iter().all(|r| r.status == RecordStatus::Complete));
        assert_eq!(records[1].transcript, "transcript of b.mp4");
    }

    #[tokio::test]
    async fn test_unknown_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        let files = create_media(&dir, &["notes.txt", "a.jpg", "archive"]);
        let doubles = Doubles::new();

        let records = create_test_orchestrator(&doubles, StubProbe::default())
            .run(files)
            .await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 0);
        assert_eq!(records[0].display_name(), "a.jpg");
    }

    #[tokio::test]
    async fn test_stored_fields_and_persons_are_kept() {
        let dir = TempDir::new().unwrap();
        let files = create_media(&dir, &["portrait.jpg"]);
        let doubles = Doubles::new();
        doubles
            .tags
            .set(&files[0], "IFD0:ImageDescription", "Two friends on a bench");
        doubles
            .tags
            .set(&files[0], "XMP-iptcExt:PersonInImage", "Anna, Ben");

        let records = create_test_orchestrator(&doubles, StubProbe::default())
            .run(files)
            .await;

        assert_eq!(doubles.captioner.calls(), 0);
        assert_eq!(records[0].caption, "Two friends on a bench");
        assert_eq!(records[0].persons, vec!["Anna".to_string(), "Ben".to_string()]);
        assert_eq!(doubles.tags.write_count(), 0);
    }

    #[tokio::test]
    async fn test_short_stored_value_is_recomputed() {
        let dir = TempDir::new().unwrap();
        let files = create_media(&dir, &["cat.png"]);
        let doubles = Doubles::new();
        doubles.tags.set(&files[0], "IFD0:ImageDescription", "abc");

        let records = create_test_orchestrator(&doubles, StubProbe::default())
            .run(files)
            .await;

        assert_eq!(doubles.captioner.calls(), 1);
        assert_eq!(records[0].caption, "A person walking a dog");
    }

    // -------------------------------------------------------------------------
    // Failure Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_caption_error_becomes_marker_and_is_not_persisted() {
        let dir = TempDir::new().unwrap();
        let files = create_media(&dir, &["a.jpg"]);
        let doubles = Doubles::new();
        doubles.captioner.set_failing(true);

        let records = create_test_orchestrator(&doubles, StubProbe::default())
            .run(files.clone())
            .await;

        assert!(is_error_marker(&records[0].caption));
        assert_eq!(records[0].status, RecordStatus::Complete);
        assert_eq!(doubles.tags.get(&files[0], "IFD0:ImageDescription"), None);

        // the next run retries
        doubles.captioner.set_failing(false);
        let records = create_test_orchestrator(&doubles, StubProbe::default())
            .run(files)
            .await;
        assert_eq!(records[0].caption, "A person walking a dog");
    }

    #[tokio::test]
    async fn test_probe_failure_degrades() {
        let dir = TempDir::new().unwrap();
        let files = create_media(&dir, &["broken.mp4"]);
        let doubles = Doubles::new();

        let records = create_test_orchestrator(&doubles, StubProbe::default().failing_on("broken.mp4"))
            .run(files)
            .await;

        // no duration, so no frames: the caption carries the error
        assert!(is_error_marker(&records[0].caption));
        assert!(records[0].length_seconds.is_none());
        assert_eq!(records[0].transcript, "transcript of broken.mp4");
        assert_eq!(records[0].status, RecordStatus::Complete);
    }

    #[tokio::test]
    async fn test_transcription_failure_fails_record_but_keeps_caption() {
        let dir = TempDir::new().unwrap();
        let files = create_media(&dir, &["talk.mp4"]);
        let mut doubles = Doubles::new();
        doubles.transcriber = Arc::new(CountingTranscriber::failing_on(&["talk.mp4"]));
        let probe = StubProbe::default().with(
            "talk.mp4",
            StructuralMetadata {
                length_seconds: Some(5.0),
                ..StructuralMetadata::default()
            },
        );

        let records = create_test_orchestrator(&doubles, probe).run(files.clone()).await;

        let record = &records[0];
        assert_eq!(record.status, RecordStatus::Failed);
        assert!(record.error.as_deref().unwrap_or_default().contains("cannot decode"));
        assert!(is_error_marker(&record.transcript));
        assert_eq!(
            doubles.tags.get(&files[0], "ItemList:Description").as_deref(),
            Some("00:00 A person walking a dog")
        );
        assert_eq!(
            doubles.tags.get(&files[0], "ItemList:Lyrics").as_deref(),
            Some("")
        );
    }

    #[tokio::test]
    async fn test_metadata_read_failure_still_annotates() {
        let dir = TempDir::new().unwrap();
        let files = create_media(&dir, &["a.jpg"]);
        let doubles = Doubles::new();
        doubles.tags.fail_reads(true);

        let records = create_test_orchestrator(&doubles, StubProbe::default())
            .run(files)
            .await;

        assert_eq!(doubles.captioner.calls(), 1);
        assert_eq!(records[0].status, RecordStatus::Complete);
    }

    #[tokio::test]
    async fn test_geocoder_failure_leaves_address_empty() {
        let dir = TempDir::new().unwrap();
        let files = create_media(&dir, &["a.jpg"]);
        let doubles = Doubles::new();
        doubles.geocoder.set_failing(true);

        let records = create_test_orchestrator(&doubles, example_probe())
            .run(files)
            .await;

        assert!(records[0].address.is_empty());
        assert_eq!(records[0].caption, "A person walking a dog");
        assert_eq!(records[0].status, RecordStatus::Complete);
    }

    #[tokio::test]
    async fn test_landmark_merge_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        let files = create_media(&dir, &["a.jpg"]);
        let doubles = Doubles::new();
        let mut settings = AnalyzerSettings::default();
        settings.analysis.merge_landmark_into_caption = false;

        let records = AnnotationOrchestrator::new(doubles.collaborators(example_probe()), &settings)
            .unwrap()
            .run(files)
            .await;

        assert_eq!(records[0].caption, "A person walking a dog");
        assert_eq!(records[0].landmark, "Eiffel Tower");
    }

    #[tokio::test]
    async fn test_invalid_encoding_is_a_config_error() {
        let doubles = Doubles::new();
        let mut settings = AnalyzerSettings::default();
        settings.metadata.encoding = "ebcdic".to_string();

        let result = AnnotationOrchestrator::new(doubles.collaborators(StubProbe::default()), &settings);
        assert!(matches!(result, Err(CoreError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_invalid_text_fails_only_that_file() {
        let dir = TempDir::new().unwrap();
        let files = create_media(&dir, &["bad.jpg", "good.jpg"]);
        let mut doubles = Doubles::new();
        doubles.captioner = Arc::new(CountingCaptioner::with_sequence(vec![
            "bell \u{7} character",
            "a quiet lake",
        ]));

        let records = create_test_orchestrator(&doubles, StubProbe::default())
            .run(files)
            .await;

        assert_eq!(records[0].status, RecordStatus::Failed);
        assert!(records[0].error.as_deref().unwrap_or_default().contains("caption"));
        assert_eq!(records[1].status, RecordStatus::Complete);
        assert_eq!(records[1].caption, "A quiet lake");
    }

    // -------------------------------------------------------------------------
    // Persons and Location Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_persons_are_identified_and_persisted() {
        let dir = TempDir::new().unwrap();
        let files = create_media(&dir, &["a.jpg", "b.mp4", "c.mp3"]);
        let mut doubles = Doubles::new();
        let persons = Arc::new(
            StubPersons::default()
                .with("a.jpg", &["Anna"])
                .with("b+00-30.png", &["Ben"])
                .with("c+cover.png", &["Carla"]),
        );
        doubles.persons = Some(persons.clone());

        let records = create_test_orchestrator(&doubles, example_probe())
            .run(files.clone())
            .await;

        assert_eq!(records[0].persons, vec!["Anna".to_string()]);
        assert_eq!(records[1].persons, vec!["Ben".to_string()]);
        assert!(records[2].persons.is_empty());
        // the image plus twelve frames; no cover for the audio file
        assert_eq!(persons.calls(), 13);
        assert_eq!(
            doubles.tags.get(&files[0], "XMP-iptcExt:PersonInImage").as_deref(),
            Some("Anna")
        );
        assert_eq!(
            doubles.tags.get(&files[1], "XMP-iptcExt:PersonInImage").as_deref(),
            Some("Ben")
        );

        // cached captions mean no second look
        create_test_orchestrator(&doubles, example_probe())
            .run(files)
            .await;
        assert_eq!(persons.calls(), 13);
    }

    #[tokio::test]
    async fn test_stored_persons_are_not_reidentified() {
        let dir = TempDir::new().unwrap();
        let files = create_media(&dir, &["a.jpg"]);
        let mut doubles = Doubles::new();
        let persons = Arc::new(StubPersons::default().with("a.jpg", &["Anna"]));
        doubles.persons = Some(persons.clone());
        doubles.tags.set(&files[0], "XMP-iptcExt:PersonInImage", "Ben");

        let records = create_test_orchestrator(&doubles, StubProbe::default())
            .run(files)
            .await;

        assert_eq!(doubles.captioner.calls(), 1);
        assert_eq!(persons.calls(), 0);
        assert_eq!(records[0].persons, vec!["Ben".to_string()]);
    }

    #[tokio::test]
    async fn test_landmark_without_address_is_not_geocoded_again() {
        let dir = TempDir::new().unwrap();
        let files = create_media(&dir, &["a.jpg"]);
        let mut doubles = Doubles::new();
        doubles.geocoder = Arc::new(StubGeocoder::new("", Some("Eiffel Tower")));

        let records = create_test_orchestrator(&doubles, example_probe())
            .run(files.clone())
            .await;
        assert_eq!(records[0].landmark, "Eiffel Tower");
        assert_eq!(
            doubles.tags.get(&files[0], "XMP-iptcCore:Location").as_deref(),
            Some("|Eiffel Tower")
        );

        let records = create_test_orchestrator(&doubles, example_probe())
            .run(files)
            .await;
        assert_eq!(doubles.geocoder.calls(), 1);
        assert_eq!(records[0].landmark, "Eiffel Tower");
        assert_eq!(doubles.tags.write_count(), 1);
    }
}
