//! Media Annotation System
//!
//! Captions, transcripts and locations for media files, stored in the
//! files' own metadata.
//!
//! - `models`: per-file records and their status machine
//! - `store`: field mapping, cache policy and safe metadata writes
//! - `describe`: image, frame and cover captioning plus person identification
//! - `orchestrator`: the per-file pipeline and transcription hand-off
//!
//! Stored values are the cache: a field that already holds computed text
//! is never recomputed.

pub mod describe;
pub mod exiftool;
pub mod models;
pub mod orchestrator;
pub mod provider;
pub mod providers;
pub mod store;

#[cfg(test)]
pub mod testing;

pub use describe::{frame_times, Describer, Description, CAPTION_SEPARATOR};
pub use exiftool::ExifTool;
pub use models::*;
pub use orchestrator::{AnnotationOrchestrator, Collaborators};
pub use provider::{FrameSource, ImageCaptioner, PersonIdentifier, Transcriber};
pub use providers::{OllamaCaptioner, OllamaPersonIdentifier};
pub use store::{field_map, AiFields, CachePolicy, FieldMap, MetadataStore, TagBackend, TextEncoding};
