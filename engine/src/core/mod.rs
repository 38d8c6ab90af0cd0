//! Mediascribe Core Engine
//!
//! Discovery, structural probing, captioning, transcription, geocoding and
//! metadata persistence for media collections.

pub mod annotations;
pub mod assets;
pub mod export;
pub mod ffmpeg;
pub mod fs;
pub mod geo;
pub mod jobs;
pub mod process;
pub mod progress;
pub mod settings;
pub mod transcription;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;
