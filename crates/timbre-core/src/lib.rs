//! Core domain model for timbre.
//!
//! This crate defines the sample and embedding types shared by every layer,
//! the error taxonomy, cooperative deadlines, and the durable SQLite-backed
//! vector store that owns the embedding corpus.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod deadline;
pub mod error;
pub mod model;
pub mod store;

pub use deadline::Deadline;
pub use error::{Error, ErrorKind, Result};
pub use store::{DistanceMetric, VectorStore};
