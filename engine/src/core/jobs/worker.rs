//! Worker Pool Module
//!
//! Fixed-size pool of transcription workers fed by a FIFO channel.
//! Outcomes flow back over a second channel to the single owner of the
//! record table; an in-flight counter lets callers wait for completion.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::core::annotations::Transcriber;
use crate::core::fs::{atomic_write_bytes, audio_transcript_path, video_transcript_path};
use crate::core::settings::TranscriptionSettings;
use crate::core::{CoreError, CoreResult, JobId, MediaKind};

use super::{TranscriptionJob, TranscriptionOutcome};

/// `None` is the poison value that stops one worker
type JobMessage = Option<TranscriptionJob>;

// =============================================================================
// Scheduler Configuration
// =============================================================================

/// Transcription pool configuration
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Number of worker tasks
    pub pool_size: usize,
    /// How long an idle worker waits before logging and waiting again
    pub idle_wait: Duration,
    /// Write transcript sidecar files next to the media
    pub write_sidecar: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pool_size: 1,
            idle_wait: Duration::from_secs(10),
            write_sidecar: false,
        }
    }
}

impl SchedulerConfig {
    pub fn from_settings(settings: &TranscriptionSettings) -> Self {
        Self {
            pool_size: settings.pool_size.max(1),
            idle_wait: settings.idle_wait(),
            write_sidecar: settings.write_sidecar,
        }
    }
}

// =============================================================================
// Completion Signal
// =============================================================================

/// Cloneable view of the in-flight counter
#[derive(Clone, Debug)]
pub struct Completion {
    rx: watch::Receiver<usize>,
}

impl Completion {
    /// Jobs enqueued but not yet delivered
    pub fn in_flight(&self) -> usize {
        *self.rx.borrow()
    }

    /// Waits until every enqueued job has delivered its outcome
    pub async fn wait(mut self) {
        // A closed counter means the pool is gone and nothing is left to wait for
        let _ = self.rx.wait_for(|n| *n == 0).await;
    }
}

// =============================================================================
// Transcription Scheduler
// =============================================================================

/// Bounded pool running transcription jobs in enqueue order
pub struct TranscriptionScheduler {
    config: SchedulerConfig,
    job_tx: mpsc::UnboundedSender<JobMessage>,
    in_flight: Arc<watch::Sender<usize>>,
    workers: Vec<JoinHandle<()>>,
}

impl TranscriptionScheduler {
    /// Spawns the workers. Returns the scheduler and the receiver of
    /// outcomes, which belongs to whoever owns the records.
    pub fn start(
        transcriber: Arc<dyn Transcriber>,
        config: SchedulerConfig,
    ) -> (Self, mpsc::UnboundedReceiver<TranscriptionOutcome>) {
        let (job_tx, job_rx) = mpsc::unbounded_channel::<JobMessage>();
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (in_flight, _) = watch::channel(0usize);
        let in_flight = Arc::new(in_flight);

        let shared_rx = Arc::new(Mutex::new(job_rx));
        let pool_size = config.pool_size.max(1);
        let mut workers = Vec::with_capacity(pool_size);

        for worker_id in 0..pool_size {
            let worker = Worker {
                id: worker_id,
                jobs: Arc::clone(&shared_rx),
                updates: updates_tx.clone(),
                in_flight: Arc::clone(&in_flight),
                transcriber: Arc::clone(&transcriber),
                idle_wait: config.idle_wait,
                write_sidecar: config.write_sidecar,
            };
            workers.push(tokio::spawn(worker.run()));
        }

        tracing::info!(
            "Transcription pool started with {} worker(s) using {}",
            pool_size,
            transcriber.name()
        );

        (
            Self {
                config,
                job_tx,
                in_flight,
                workers,
            },
            updates_rx,
        )
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Queues a job without blocking
    pub fn enqueue(&self, job: TranscriptionJob) -> CoreResult<JobId> {
        if !job.kind.is_transcribable() {
            return Err(CoreError::UnsupportedKind {
                kind: job.kind,
                operation: "transcription",
            });
        }

        let job_id = job.id.clone();
        // Count first so a concurrent drain never sees zero while the job is queued
        self.in_flight.send_modify(|n| *n += 1);
        if self.job_tx.send(Some(job)).is_err() {
            self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
            return Err(CoreError::SchedulerStopped(
                "transcription workers have exited".to_string(),
            ));
        }

        tracing::debug!("Queued transcription job {}", job_id);
        Ok(job_id)
    }

    /// Jobs enqueued but not yet delivered
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Handle for waiting on completion from another task
    pub fn completion(&self) -> Completion {
        Completion {
            rx: self.in_flight.subscribe(),
        }
    }

    /// Waits until every enqueued job has been processed and its outcome
    /// delivered
    pub async fn drain(&self) {
        self.completion().wait().await
    }

    /// Stops the pool cooperatively: each worker finishes its current job,
    /// then exits on its poison value.
    pub async fn shutdown(self) {
        for _ in 0..self.workers.len() {
            if self.job_tx.send(None).is_err() {
                break;
            }
        }
        for handle in self.workers {
            if let Err(e) = handle.await {
                tracing::error!("Transcription worker ended abnormally: {}", e);
            }
        }
        tracing::info!("Transcription pool stopped");
    }
}

// =============================================================================
// Worker
// =============================================================================

struct Worker {
    id: usize,
    jobs: Arc<Mutex<mpsc::UnboundedReceiver<JobMessage>>>,
    updates: mpsc::UnboundedSender<TranscriptionOutcome>,
    in_flight: Arc<watch::Sender<usize>>,
    transcriber: Arc<dyn Transcriber>,
    idle_wait: Duration,
    write_sidecar: bool,
}

impl Worker {
    async fn run(self) {
        tracing::info!("Worker {} started", self.id);

        loop {
            let next = {
                let mut rx = self.jobs.lock().await;
                tokio::time::timeout(self.idle_wait, rx.recv()).await
            };

            match next {
                Err(_) => {
                    tracing::debug!("Worker {} idle, waiting for jobs", self.id);
                }
                Ok(Some(Some(job))) => self.process(job).await,
                Ok(Some(None)) => {
                    tracing::info!("Worker {} shutting down", self.id);
                    break;
                }
                Ok(None) => {
                    tracing::info!("Worker {} job queue closed", self.id);
                    break;
                }
            }
        }
    }

    async fn process(&self, job: TranscriptionJob) {
        tracing::info!(
            "Worker {} transcribing {} (job {})",
            self.id,
            job.path.display(),
            job.id
        );

        let transcriber = Arc::clone(&self.transcriber);
        let path = job.path.clone();
        let kind = job.kind;
        let result = match tokio::task::spawn_blocking(move || transcriber.transcribe(&path, kind))
            .await
        {
            Ok(Ok(text)) => Ok(text.trim().to_string()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => Err(format!("Transcription task failed: {}", e)),
        };

        let sidecar = match &result {
            Ok(text) if self.write_sidecar => write_sidecar(&job, text),
            _ => None,
        };

        match &result {
            Ok(_) => tracing::info!("Job {} completed successfully", job.id),
            Err(error) => tracing::error!("Job {} failed: {}", job.id, error),
        }

        let outcome = TranscriptionOutcome {
            job_id: job.id,
            record_id: job.record_id,
            path: job.path,
            length_seconds: job.length_seconds,
            result,
            sidecar,
            completed_at: chrono::Utc::now().to_rfc3339(),
        };

        if self.updates.send(outcome).is_err() {
            tracing::warn!("Worker {}: outcome receiver dropped", self.id);
        }
        self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Sidecar path and contents for a finished job
pub fn sidecar_for(job: &TranscriptionJob, transcript: &str) -> Option<(PathBuf, String)> {
    match job.kind {
        MediaKind::Audio => Some((audio_transcript_path(&job.path), transcript.to_string())),
        MediaKind::Video => {
            let frames = job.caption_so_far.replace(" | ", "\n").replace('|', "\n");
            Some((
                video_transcript_path(&job.path),
                format!("{}\n\n{}", transcript, frames),
            ))
        }
        MediaKind::Image | MediaKind::Unknown => None,
    }
}

fn write_sidecar(job: &TranscriptionJob, transcript: &str) -> Option<PathBuf> {
    let (path, contents) = sidecar_for(job, transcript)?;
    match atomic_write_bytes(&path, contents.as_bytes()) {
        Ok(()) => Some(path),
        Err(e) => {
            tracing::warn!("Could not write transcript {}: {}", path.display(), e);
            None
        }
    }
}
