//! Durable embedding storage and nearest-neighbor queries.

pub mod db;
pub mod metric;
pub mod migrations;

pub use db::{DerivedCounts, VectorStore};
pub use metric::DistanceMetric;
