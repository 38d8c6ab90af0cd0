//! Media Assets Module
//!
//! Classification, discovery and structural metadata for input files.

mod classifier;
mod discovery;
pub mod metadata;

pub use classifier::{classify, classify_extension, SUPPORTED_EXTENSIONS};
pub use discovery::{discover_media, relative_display};
pub use metadata::{MediaProbe, MetadataExtractor, StructuralMetadata};
