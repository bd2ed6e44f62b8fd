//! Incremental ingestion of new samples into the corpus.
//!
//! Each sample moves through a fixed sequence of states:
//!
//! ```text
//! Received → Extracted → Embedded → (ClusterAssigned | ClusterSkipped) → Stored → Done
//! ```
//!
//! Any step can fail, which ends the run in `Failed`. The single
//! `VectorStore::add` call is the commit point, so a failed or cancelled
//! ingestion leaves no trace in the store. The decoded waveform is owned by
//! the run and dropped as soon as features are extracted.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use timbre_analysis::ClusterModel;
use timbre_core::model::{AudioSample, ClusterLabel, Embedding, NewSample, SampleId, SampleMetadata};
use timbre_core::{Deadline, Error, ErrorKind, Result, VectorStore};

use crate::embed::Embedder;
use crate::features::FeatureExtractor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Received,
    Extracted,
    Embedded,
    ClusterAssigned,
    ClusterSkipped,
    Stored,
    Done,
    Failed,
}

impl IngestStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Extracted => "extracted",
            Self::Embedded => "embedded",
            Self::ClusterAssigned => "cluster_assigned",
            Self::ClusterSkipped => "cluster_skipped",
            Self::Stored => "stored",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub id: SampleId,
    pub cluster: ClusterLabel,
    /// Corpus size right after the commit.
    pub total_count: usize,
    /// Every state visited, ending in `Done`.
    pub trail: Vec<IngestStage>,
}

impl IngestReport {
    /// Cluster as the serving layer reports it (`-1` when none).
    pub fn cluster_id(&self) -> i64 {
        self.cluster.wire_id()
    }
}

/// An ingestion that stopped before `Done`.
#[derive(Debug, Error)]
#[error("ingesting {filename} failed after {stage}: {source}")]
pub struct IngestFailure {
    pub filename: String,
    /// Last state reached before the failure.
    pub stage: IngestStage,
    /// Every state visited, ending in `Failed`.
    pub trail: Vec<IngestStage>,
    /// Shared when one commit failure fails a whole batch.
    pub source: Arc<Error>,
}

impl IngestFailure {
    pub fn error(&self) -> &Error {
        &self.source
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

/// Progress of one sample through the state machine.
#[derive(Debug)]
struct Run {
    filename: String,
    trail: Vec<IngestStage>,
}

impl Run {
    fn start(filename: &str) -> Self {
        log::debug!("{}: {}", filename, IngestStage::Received);
        Self {
            filename: filename.to_string(),
            trail: vec![IngestStage::Received],
        }
    }

    fn advance(&mut self, stage: IngestStage) {
        log::debug!("{}: {}", self.filename, stage);
        self.trail.push(stage);
    }

    fn current(&self) -> IngestStage {
        self.trail.last().copied().unwrap_or(IngestStage::Received)
    }

    fn fail(&mut self, source: impl Into<Arc<Error>>) -> IngestFailure {
        let source = source.into();
        let stage = self.current();
        log::warn!("Ingesting {} failed after {}: {}", self.filename, stage, source);
        let mut trail = std::mem::take(&mut self.trail);
        trail.push(IngestStage::Failed);
        IngestFailure {
            filename: std::mem::take(&mut self.filename),
            stage,
            trail,
            source,
        }
    }

    fn finish(mut self, id: SampleId, cluster: ClusterLabel, total_count: usize) -> IngestReport {
        self.advance(IngestStage::Stored);
        self.advance(IngestStage::Done);
        IngestReport {
            id,
            cluster,
            total_count,
            trail: self.trail,
        }
    }
}

/// A sample that has passed every step before the commit.
#[derive(Debug)]
struct Prepared {
    run: Run,
    row: NewSample,
}

/// Runs new samples through extraction, embedding, optional cluster
/// assignment and the store commit.
///
/// The cluster model is passed per call rather than held, so a refit can
/// swap models between calls without touching the orchestrator.
#[derive(Debug)]
pub struct IngestionOrchestrator {
    store: Arc<VectorStore>,
    extractor: FeatureExtractor,
    embedder: Embedder,
}

impl IngestionOrchestrator {
    /// Bind to a store; an existing corpus fixes the expected embedding length.
    pub fn new(store: Arc<VectorStore>, extractor: FeatureExtractor) -> Result<Self> {
        let embedder = match store.dimension()? {
            Some(dimension) => Embedder::with_dimension(dimension),
            None => Embedder::new(),
        };
        Ok(Self {
            store,
            extractor,
            embedder,
        })
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// Ingest one sample.
    ///
    /// Without a model, or with a density model that cannot predict, the
    /// sample is stored as `Unassigned`.
    pub fn ingest(
        &self,
        sample: AudioSample,
        model: Option<&ClusterModel>,
        deadline: &Deadline,
    ) -> std::result::Result<IngestReport, IngestFailure> {
        let Prepared { mut run, row } = self.prepare(sample, model, deadline)?;
        let total = self
            .commit(std::slice::from_ref(&row), deadline)
            .map_err(|e| run.fail(e))?;
        Ok(run.finish(row.id, row.metadata.cluster, total))
    }

    /// Ingest many samples with a single commit.
    ///
    /// `deadline` is called once per sample and once more for the commit, so
    /// a per-file budget restarts for every file. Returns exactly one outcome
    /// per input, in input order. Items that fail before the commit report
    /// their own error; if the commit itself fails, every item that reached
    /// it reports that failure and nothing is stored.
    pub fn ingest_batch(
        &self,
        samples: Vec<AudioSample>,
        model: Option<&ClusterModel>,
        deadline: impl Fn() -> Deadline,
    ) -> Vec<std::result::Result<IngestReport, IngestFailure>> {
        let mut rows = Vec::with_capacity(samples.len());
        let pending: Vec<_> = samples
            .into_iter()
            .map(|sample| {
                self.prepare(sample, model, &deadline()).map(|prepared| {
                    let slot = (prepared.run, prepared.row.id, prepared.row.metadata.cluster);
                    rows.push(prepared.row);
                    slot
                })
            })
            .collect();

        let committed = if rows.is_empty() {
            Ok(0)
        } else {
            self.commit(&rows, &deadline()).map_err(Arc::new)
        };

        pending
            .into_iter()
            .map(|slot| {
                let (mut run, id, cluster) = slot?;
                match &committed {
                    Ok(total) => Ok(run.finish(id, cluster, *total)),
                    Err(e) => Err(run.fail(Arc::clone(e))),
                }
            })
            .collect()
    }

    /// Extract and embed without storing, for similarity queries.
    pub fn query_embedding(&self, sample: &AudioSample, deadline: &Deadline) -> Result<Embedding> {
        let features = self.extractor.extract(sample, deadline)?;
        self.embedder.embed(&features)
    }

    fn prepare(
        &self,
        sample: AudioSample,
        model: Option<&ClusterModel>,
        deadline: &Deadline,
    ) -> std::result::Result<Prepared, IngestFailure> {
        let AudioSample {
            samples,
            sample_rate,
            duration_secs,
            filename,
            genre,
            source_path,
        } = sample;
        let mut run = Run::start(&filename);

        deadline.check("ingest").map_err(|e| run.fail(e))?;
        let extracted = self
            .extractor
            .extract_waveform(&samples, sample_rate, deadline);
        drop(samples);
        let features = extracted.map_err(|e| run.fail(e))?;
        run.advance(IngestStage::Extracted);

        deadline.check("ingest").map_err(|e| run.fail(e))?;
        let embedding = self.embedder.embed(&features).map_err(|e| run.fail(e))?;
        run.advance(IngestStage::Embedded);

        let cluster = match model {
            Some(model) if model.can_predict() => {
                let label = model
                    .assign(embedding.as_slice())
                    .map_err(|e| run.fail(e))?;
                run.advance(IngestStage::ClusterAssigned);
                label
            }
            _ => {
                run.advance(IngestStage::ClusterSkipped);
                ClusterLabel::Unassigned
            }
        };

        let metadata = SampleMetadata::new(filename, genre, duration_secs, source_path)
            .with_cluster(cluster);
        Ok(Prepared {
            run,
            row: NewSample::new(SampleId::new(), embedding, metadata),
        })
    }

    fn commit(&self, rows: &[NewSample], deadline: &Deadline) -> Result<usize> {
        deadline.check("ingest")?;
        let total = self.store.add(rows)?;
        log::info!("Committed {} sample(s); corpus holds {}", rows.len(), total);
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use timbre_core::model::FEATURE_DIM;
    use timbre_core::DistanceMetric;

    const RATE: u32 = 22050;

    #[allow(clippy::cast_precision_loss)]
    fn tone(name: &str, freq: f32) -> AudioSample {
        let samples = (0..RATE as usize / 2)
            .map(|i| 0.4 * (2.0 * std::f32::consts::PI * freq * i as f32 / RATE as f32).sin())
            .collect();
        AudioSample::new(samples, RATE, name, "test", format!("/lib/test/{name}"))
    }

    fn orchestrator() -> IngestionOrchestrator {
        let store = Arc::new(VectorStore::open_in_memory(DistanceMetric::Euclidean).unwrap());
        IngestionOrchestrator::new(store, FeatureExtractor::default()).unwrap()
    }

    #[test]
    fn test_ingest_without_model_is_unassigned() {
        let orch = orchestrator();
        let report = orch
            .ingest(tone("a.wav", 440.0), None, &Deadline::none())
            .unwrap();

        assert_eq!(report.cluster, ClusterLabel::Unassigned);
        assert_eq!(report.cluster_id(), -1);
        assert_eq!(report.total_count, 1);
        assert_eq!(
            report.trail,
            vec![
                IngestStage::Received,
                IngestStage::Extracted,
                IngestStage::Embedded,
                IngestStage::ClusterSkipped,
                IngestStage::Stored,
                IngestStage::Done,
            ]
        );
        let stored = orch.store().get(&report.id).unwrap().unwrap();
        assert_eq!(stored.embedding.len(), FEATURE_DIM);
        assert_eq!(stored.metadata.filename, "a.wav");
    }

    #[test]
    fn test_centroid_model_assigns() {
        let orch = orchestrator();
        let mut far = vec![100.0; FEATURE_DIM];
        far[0] = -100.0;
        let model = ClusterModel::Centroid {
            dimension: FEATURE_DIM,
            centroids: vec![far, vec![0.0; FEATURE_DIM]],
        };

        let report = orch
            .ingest(tone("b.wav", 880.0), Some(&model), &Deadline::none())
            .unwrap();
        assert_eq!(report.cluster, ClusterLabel::Cluster(1));
        assert!(report.trail.contains(&IngestStage::ClusterAssigned));
    }

    #[test]
    fn test_density_model_is_skipped() {
        let orch = orchestrator();
        let model = ClusterModel::Density {
            dimension: FEATURE_DIM,
            eps: 0.5,
            min_points: 5,
        };
        let report = orch
            .ingest(tone("c.wav", 220.0), Some(&model), &Deadline::none())
            .unwrap();
        assert_eq!(report.cluster, ClusterLabel::Unassigned);
        assert!(report.trail.contains(&IngestStage::ClusterSkipped));
    }

    #[test]
    fn test_model_of_wrong_dimension_fails_before_commit() {
        let orch = orchestrator();
        let model = ClusterModel::Centroid {
            dimension: 3,
            centroids: vec![vec![0.0; 3]],
        };
        let failure = orch
            .ingest(tone("d.wav", 220.0), Some(&model), &Deadline::none())
            .unwrap_err();
        assert_eq!(failure.stage, IngestStage::Embedded);
        assert_eq!(failure.trail.last(), Some(&IngestStage::Failed));
        assert_eq!(orch.store().count().unwrap(), 0);
    }

    #[test]
    fn test_empty_waveform_fails_at_extraction() {
        let orch = orchestrator();
        let sample = AudioSample::new(Vec::new(), RATE, "empty.wav", "test", "/lib/empty.wav");
        let failure = orch.ingest(sample, None, &Deadline::none()).unwrap_err();

        assert_eq!(failure.stage, IngestStage::Received);
        assert!(matches!(failure.error(), Error::Extraction(_)));
        assert_eq!(failure.kind(), ErrorKind::InvalidInput);
        assert_eq!(orch.store().count().unwrap(), 0);
    }

    #[test]
    fn test_dimension_drift_is_rejected() {
        let store = Arc::new(VectorStore::open_in_memory(DistanceMetric::Euclidean).unwrap());
        store
            .add(&[NewSample::new(
                SampleId::new(),
                Embedding::new(vec![0.0; 10]),
                SampleMetadata::new("old.wav", "legacy", 1.0, "/old.wav"),
            )])
            .unwrap();

        let orch = IngestionOrchestrator::new(Arc::clone(&store), FeatureExtractor::default()).unwrap();
        let failure = orch
            .ingest(tone("new.wav", 440.0), None, &Deadline::none())
            .unwrap_err();
        assert_eq!(failure.stage, IngestStage::Extracted);
        assert!(matches!(
            failure.error(),
            Error::DimensionMismatch {
                expected: 10,
                actual: FEATURE_DIM
            }
        ));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_cancelled_ingest_leaves_no_record() {
        let orch = orchestrator();
        let flag = Arc::new(AtomicBool::new(true));
        let deadline = Deadline::none().with_cancel(flag);

        let failure = orch
            .ingest(tone("e.wav", 440.0), None, &deadline)
            .unwrap_err();
        assert!(matches!(failure.error(), Error::Cancelled { .. }));
        assert_eq!(orch.store().count().unwrap(), 0);
    }

    #[test]
    fn test_batch_reports_every_item() {
        let orch = orchestrator();
        let batch = vec![
            tone("1.wav", 220.0),
            AudioSample::new(Vec::new(), RATE, "2.wav", "test", "/lib/2.wav"),
            tone("3.wav", 660.0),
        ];

        let outcomes = orch.ingest_batch(batch, None, Deadline::none);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_ok());
        assert_eq!(outcomes[1].as_ref().unwrap_err().filename, "2.wav");
        let last = outcomes[2].as_ref().unwrap();
        assert_eq!(last.total_count, 2);
        assert_eq!(orch.store().count().unwrap(), 2);
    }

    #[test]
    fn test_failed_commit_fails_every_prepared_item() {
        let store = Arc::new(VectorStore::open_in_memory(DistanceMetric::Euclidean).unwrap());
        let orch = IngestionOrchestrator::new(Arc::clone(&store), FeatureExtractor::default()).unwrap();
        // Another writer fixes a different dimension after the orchestrator was bound.
        store
            .add(&[NewSample::new(
                SampleId::new(),
                Embedding::new(vec![0.0; 4]),
                SampleMetadata::new("other.wav", "legacy", 1.0, "/other.wav"),
            )])
            .unwrap();

        let outcomes = orch.ingest_batch(
            vec![tone("x.wav", 300.0), tone("y.wav", 600.0)],
            None,
            Deadline::none,
        );
        assert_eq!(outcomes.len(), 2);
        for outcome in &outcomes {
            let failure = outcome.as_ref().unwrap_err();
            assert_eq!(failure.stage, IngestStage::ClusterSkipped);
            assert!(matches!(failure.error(), Error::DimensionMismatch { .. }));
        }
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_batch_takes_a_fresh_deadline_per_file() {
        let orch = orchestrator();
        let issued = std::cell::Cell::new(0_usize);
        let outcomes = orch.ingest_batch(
            vec![tone("f.wav", 220.0), tone("g.wav", 330.0), tone("h.wav", 440.0)],
            None,
            || {
                issued.set(issued.get() + 1);
                Deadline::after(std::time::Duration::from_secs(60))
            },
        );
        assert!(outcomes.iter().all(std::result::Result::is_ok));
        assert_eq!(issued.get(), 4);
    }

    #[test]
    fn test_expired_batch_budget_fails_every_item() {
        let orch = orchestrator();
        let outcomes = orch.ingest_batch(
            vec![tone("i.wav", 220.0), tone("j.wav", 330.0)],
            None,
            || Deadline::after(std::time::Duration::ZERO),
        );
        for outcome in &outcomes {
            let failure = outcome.as_ref().unwrap_err();
            assert!(matches!(failure.error(), Error::Timeout { .. }));
        }
        assert_eq!(orch.store().count().unwrap(), 0);
    }

    #[test]
    fn test_query_embedding_does_not_store() {
        let orch = orchestrator();
        let embedding = orch
            .query_embedding(&tone("q.wav", 440.0), &Deadline::none())
            .unwrap();
        assert_eq!(embedding.len(), FEATURE_DIM);
        assert_eq!(orch.store().count().unwrap(), 0);
    }
}
