//! Mediascribe Command-Line Interface
//!
//! Headless front end: analyze a folder, inspect or clear the stored
//! fields of single files, and manage persisted settings.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use mediascribe_lib::core::annotations::{
    AnnotationOrchestrator, CachePolicy, ExifTool, MetadataStore, OllamaCaptioner, RecordStatus,
};
use mediascribe_lib::core::assets::{classify, discover_media};
use mediascribe_lib::core::export::{export_records, ExportFormat};
use mediascribe_lib::core::settings::{default_settings_dir, AnalyzerSettings, SettingsManager};

/// Mediascribe - AI annotations for media collections
#[derive(Parser, Debug)]
#[command(name = "mediascribe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings directory (defaults to the platform config dir)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Also write daily rolling log files into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Caption, transcribe and geocode every media file under PATH
    Analyze(AnalyzeArgs),
    /// Print the stored AI fields of a file as JSON
    Read {
        file: PathBuf,
    },
    /// Remove the stored AI fields from files
    Clear {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Show or reset persisted settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum SettingsAction {
    /// Print the effective settings
    Show,
    /// Print the settings file location
    Path,
    /// Delete the settings file and print the defaults
    Reset,
}

#[derive(Parser, Debug, Clone, Default)]
struct AnalyzeArgs {
    /// Folder or single file to analyze
    path: PathBuf,

    /// Export file (defaults to <folder>/_media_analysis.<format>)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Export format: csv or json
    #[arg(short, long)]
    format: Option<String>,

    /// Seconds between sampled video frames
    #[arg(long)]
    interval: Option<f64>,

    /// Number of transcription workers
    #[arg(long)]
    pool_size: Option<usize>,

    /// Skip reverse geocoding
    #[arg(long)]
    no_geo: bool,

    /// Identify people against the portraits in DIR (one folder per person)
    #[arg(long, value_name = "DIR")]
    faces: Option<PathBuf>,

    /// Keep extracted video frames next to the source
    #[arg(long)]
    keep_frames: bool,

    /// Write transcript sidecar files
    #[arg(long)]
    sidecars: bool,
}

impl AnalyzeArgs {
    /// Overrides settings for this run only
    fn apply(&self, settings: &mut AnalyzerSettings) {
        if let Some(interval) = self.interval {
            settings.analysis.frame_interval_secs = interval;
        }
        if let Some(pool_size) = self.pool_size {
            settings.transcription.pool_size = pool_size;
        }
        if let Some(ref format) = self.format {
            settings.export.format = format.clone();
        }
        if self.no_geo {
            settings.geo.enabled = false;
        }
        if let Some(ref faces) = self.faces {
            settings.persons.enabled = true;
            settings.persons.faces_dir = Some(faces.to_string_lossy().to_string());
        }
        if self.keep_frames {
            settings.analysis.keep_frames = true;
        }
        if self.sidecars {
            settings.transcription.write_sidecar = true;
        }
        settings.normalize();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    mediascribe_lib::init_logging(cli.log_dir.as_deref(), cli.verbose);

    let manager = SettingsManager::new(cli.config_dir.clone().unwrap_or_else(default_settings_dir));

    match cli.command {
        Commands::Analyze(args) => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            runtime.block_on(analyze(&manager, args))
        }
        Commands::Read { file } => read(&manager, &file),
        Commands::Clear { files } => clear(&manager, &files),
        Commands::Settings { action } => settings(&manager, action),
    }
}

// =============================================================================
// Commands
// =============================================================================

async fn analyze(manager: &SettingsManager, args: AnalyzeArgs) -> Result<()> {
    let mut settings = manager.load();
    args.apply(&mut settings);
    settings.validate().context("Invalid configuration")?;

    let format: ExportFormat = settings.export.format.parse()?;
    let root = analysis_root(&args.path);
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&root, &settings.export.file_name, format));

    let files = discover_media(&args.path)
        .with_context(|| format!("Failed to list {}", args.path.display()))?;
    if files.is_empty() {
        tracing::warn!("No files found under {}", args.path.display());
    }

    if !OllamaCaptioner::new(&settings.captioning)?
        .check_health()
        .await
    {
        tracing::warn!(
            "Ollama is not reachable at {}; captions will carry errors",
            settings.captioning.base_url
        );
    }

    let orchestrator = AnnotationOrchestrator::from_settings(&settings)
        .context("Failed to set up annotation pipeline")?;
    let records = orchestrator.run(files).await;

    export_records(&records, &root, format, &output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let failed: Vec<_> = records
        .iter()
        .filter(|r| r.status == RecordStatus::Failed)
        .collect();
    for record in &failed {
        tracing::warn!(
            "{}: {}",
            record.display_name(),
            record.error.as_deref().unwrap_or("failed")
        );
    }
    println!(
        "Annotated {} file(s), {} failed. Results: {}",
        records.len(),
        failed.len(),
        output.display()
    );
    Ok(())
}

fn metadata_store(settings: &AnalyzerSettings) -> Result<MetadataStore> {
    let tool = ExifTool::from_settings(settings.tools.exiftool_path.as_deref());
    if !tool.is_available() {
        bail!("exiftool not found. Install it or set tools.exiftoolPath.");
    }
    Ok(MetadataStore::new(
        Arc::new(tool),
        CachePolicy::new(settings.analysis.min_cached_chars),
        settings.metadata.encoding.parse()?,
    ))
}

fn read(manager: &SettingsManager, file: &Path) -> Result<()> {
    let settings = manager.load();
    let kind = classify(file);
    if !kind.is_known() {
        bail!("Unsupported file type: {}", file.display());
    }
    if !file.exists() {
        bail!("File not found: {}", file.display());
    }

    let fields = metadata_store(&settings)?.read(file, kind);
    println!("{}", serde_json::to_string_pretty(&fields)?);
    Ok(())
}

fn clear(manager: &SettingsManager, files: &[PathBuf]) -> Result<()> {
    let settings = manager.load();
    let store = metadata_store(&settings)?;

    let mut failures = 0;
    for file in files {
        let kind = classify(file);
        if !kind.is_known() {
            tracing::warn!("Skipping {}: unsupported file type", file.display());
            continue;
        }
        match store.delete(file, kind) {
            Ok(()) => println!("Cleared {}", file.display()),
            Err(e) => {
                tracing::error!("Clearing {} failed: {}", file.display(), e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{} file(s) could not be cleared", failures);
    }
    Ok(())
}

fn settings(manager: &SettingsManager, action: SettingsAction) -> Result<()> {
    match action {
        SettingsAction::Show => {
            println!("{}", serde_json::to_string_pretty(&manager.load())?);
        }
        SettingsAction::Path => {
            println!("{}", manager.settings_path().display());
        }
        SettingsAction::Reset => {
            let defaults = manager.reset().context("Failed to reset settings")?;
            println!("{}", serde_json::to_string_pretty(&defaults)?);
        }
    }
    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

/// Folder export paths are made relative to
fn analysis_root(path: &Path) -> PathBuf {
    if path.is_file() {
        path.parent().map(Path::to_path_buf).unwrap_or_default()
    } else {
        path.to_path_buf()
    }
}

fn default_output(root: &Path, file_name: &str, format: ExportFormat) -> PathBuf {
    root.join(file_name).with_extension(format.extension())
}
