//! Loading and ingestion layer for timbre.
//!
//! Decodes audio files, turns waveforms into fixed-length feature vectors,
//! standardizes them into embeddings and commits them to the vector store.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod audio;
pub mod config;
pub mod embed;
pub mod features;
pub mod ingest;
pub mod scan;

pub use config::Config;
pub use embed::Embedder;
pub use features::{ExtractorConfig, FeatureExtractor};
pub use ingest::{IngestFailure, IngestReport, IngestStage, IngestionOrchestrator};
pub use scan::{scan_library, LibraryEntry};
