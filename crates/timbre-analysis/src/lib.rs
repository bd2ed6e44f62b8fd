//! Corpus analysis for timbre.
//!
//! Every analysis step reads a [`CorpusSnapshot`](timbre_core::model::CorpusSnapshot)
//! (or its raw embedding rows) and produces new artifacts: cluster labels and
//! a reusable cluster model, an isolation-forest anomaly model, 2D/3D
//! projections, and a held-out genre classification report. Nothing here writes to the store; the driver decides when
//! and how to persist results.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod anomaly;
pub mod artifacts;
mod blob;
pub mod classifier;
pub mod clustering;
mod matrix;
pub mod projection;

pub use anomaly::{AnomalyConfig, AnomalyModel, AnomalyScorer, FlaggedSample};
pub use classifier::{ClassifierConfig, EvaluationReport, GenreClassifier, GenreModel};
pub use clustering::{
    find_optimal_k, ClusterConfig, ClusterFit, ClusterMethod, ClusterMetrics, ClusterModel,
    ClusteringEngine, KSweep,
};
pub use projection::{Projection, ProjectionEngine, ProjectionMethod};
