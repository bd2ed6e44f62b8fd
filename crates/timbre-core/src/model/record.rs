use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::model::ids::SampleId;
use crate::model::label::{AnomalyVerdict, ClusterLabel};
use crate::model::vector::Embedding;

/// Descriptive and derived fields stored next to an embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleMetadata {
    /// File name without directories (e.g. `kick_01.wav`).
    pub filename: String,

    /// Genre label supplied by the loading layer.
    pub genre: String,

    /// Duration of the decoded waveform in seconds.
    pub duration_secs: f64,

    /// Where the audio was loaded from.
    pub source_path: PathBuf,

    // --- Derived fields (written back by corpus analysis) ---
    /// Cluster membership, `Unassigned` until a model has been applied.
    pub cluster: ClusterLabel,

    /// Whether the last anomaly pass flagged this sample.
    pub is_anomaly: Option<bool>,

    /// Anomaly score from the last pass (lower is more anomalous).
    pub anomaly_score: Option<f64>,
}

impl SampleMetadata {
    #[must_use]
    pub fn new(
        filename: impl Into<String>,
        genre: impl Into<String>,
        duration_secs: f64,
        source_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            filename: filename.into(),
            genre: genre.into(),
            duration_secs,
            source_path: source_path.into(),
            cluster: ClusterLabel::Unassigned,
            is_anomaly: None,
            anomaly_score: None,
        }
    }

    #[must_use]
    pub fn with_cluster(mut self, cluster: ClusterLabel) -> Self {
        self.cluster = cluster;
        self
    }

    /// Apply an anomaly verdict to the derived fields.
    pub fn apply_verdict(&mut self, verdict: AnomalyVerdict) {
        self.is_anomaly = Some(verdict.is_anomaly);
        self.anomaly_score = Some(verdict.score);
    }
}

/// A sample ready to be committed to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSample {
    pub id: SampleId,
    pub embedding: Embedding,
    pub metadata: SampleMetadata,
}

impl NewSample {
    #[must_use]
    pub fn new(id: SampleId, embedding: Embedding, metadata: SampleMetadata) -> Self {
        Self {
            id,
            embedding,
            metadata,
        }
    }
}

/// A stored sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub id: SampleId,
    pub embedding: Embedding,
    pub metadata: SampleMetadata,
    pub created_at: DateTime<Utc>,
}

/// One ranked result of a nearest-neighbor query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: SampleId,
    pub filename: String,
    pub genre: String,
    pub distance: f64,
    pub metadata: SampleMetadata,
}

/// Every embedding and its metadata, captured at one point in time.
///
/// Rows are in store insertion order. Analysis reads a snapshot and produces
/// new artifacts; it never edits the snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorpusSnapshot {
    pub ids: Vec<SampleId>,
    pub embeddings: Vec<Vec<f32>>,
    pub metadata: Vec<SampleMetadata>,
}

impl CorpusSnapshot {
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Embedding dimension, if any rows exist.
    #[must_use]
    pub fn dimension(&self) -> Option<usize> {
        self.embeddings.first().map(Vec::len)
    }

    /// Fail with `CorpusEmpty` when there is nothing to analyse.
    pub fn require_non_empty(&self) -> Result<()> {
        if self.is_empty() {
            Err(Error::CorpusEmpty)
        } else {
            Ok(())
        }
    }

    pub(crate) fn push(&mut self, id: SampleId, embedding: Vec<f32>, metadata: SampleMetadata) {
        self.ids.push(id);
        self.embeddings.push(embedding);
        self.metadata.push(metadata);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_starts_unassigned() {
        let meta = SampleMetadata::new("a.wav", "techno", 1.0, "/x/a.wav");
        assert_eq!(meta.cluster, ClusterLabel::Unassigned);
        assert!(meta.is_anomaly.is_none());
    }

    #[test]
    fn test_apply_verdict() {
        let mut meta = SampleMetadata::new("a.wav", "techno", 1.0, "/x/a.wav");
        meta.apply_verdict(AnomalyVerdict {
            is_anomaly: true,
            score: -0.7,
        });
        assert_eq!(meta.is_anomaly, Some(true));
        assert_eq!(meta.anomaly_score, Some(-0.7));
    }

    #[test]
    fn test_empty_snapshot_is_rejected() {
        let snapshot = CorpusSnapshot::default();
        assert!(matches!(
            snapshot.require_non_empty(),
            Err(Error::CorpusEmpty)
        ));
        assert!(snapshot.dimension().is_none());
    }
}
