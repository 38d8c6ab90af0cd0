//! Model Providers
//!
//! - **ollama.rs**: vision model served by a local Ollama instance
//! - **persons.rs**: reference-face person identification on the same model

pub mod ollama;
pub mod persons;

pub use ollama::{OllamaCaptioner, OllamaClient};
pub use persons::{load_reference_faces, OllamaPersonIdentifier, ReferenceFace};
