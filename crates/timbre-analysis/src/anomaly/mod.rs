//! Outlier detection over the embedding corpus.
//!
//! [`AnomalyScorer`] fits an isolation forest to a reference set and sets a
//! decision threshold at the configured contamination quantile of the
//! training scores. The contamination rate is a policy knob: on small or
//! degenerate corpora the flagged share can differ from it.

mod forest;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use timbre_core::model::{AnomalyVerdict, CorpusSnapshot, SampleId, SampleMetadata};
use timbre_core::{Error, Result};

use crate::blob;
use crate::matrix::{check_dimension, percentile, to_f64_rows};
use forest::IsolationForest;

const BLOB_KIND: &str = "anomaly_model";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyConfig {
    /// Expected outlier share, in `(0, 0.5]`.
    pub contamination: f64,
    pub n_estimators: usize,
    pub max_samples: usize,
    pub seed: u64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            contamination: 0.1,
            n_estimators: 100,
            max_samples: 256,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnomalyScorer {
    config: AnomalyConfig,
}

impl AnomalyScorer {
    pub fn new(config: AnomalyConfig) -> Result<Self> {
        if !(config.contamination > 0.0 && config.contamination <= 0.5) {
            return Err(Error::invalid(format!(
                "contamination must be in (0, 0.5], got {}",
                config.contamination
            )));
        }
        if config.n_estimators == 0 || config.max_samples == 0 {
            return Err(Error::invalid(
                "n_estimators and max_samples must be positive",
            ));
        }
        Ok(Self { config })
    }

    pub fn fit(&self, embeddings: &[Vec<f32>]) -> Result<AnomalyModel> {
        let (points, dimension) = to_f64_rows(embeddings)?;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let forest = IsolationForest::fit(
            &points,
            self.config.n_estimators,
            self.config.max_samples,
            &mut rng,
        );

        let scores: Vec<f64> = points.iter().map(|p| forest.score(p)).collect();
        let threshold = percentile(&scores, self.config.contamination);
        let flagged = scores.iter().filter(|&&s| s < threshold).count();
        log::info!(
            "Fitted isolation forest on {} samples: threshold {:.4}, {} flagged",
            points.len(),
            threshold,
            flagged
        );

        Ok(AnomalyModel {
            dimension,
            contamination: self.config.contamination,
            threshold,
            forest,
        })
    }
}

/// A sample flagged as anomalous, with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedSample {
    pub id: SampleId,
    pub metadata: SampleMetadata,
    pub score: f64,
}

/// A fitted isolation forest and its decision threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyModel {
    dimension: usize,
    contamination: f64,
    threshold: f64,
    forest: IsolationForest,
}

impl AnomalyModel {
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn contamination(&self) -> f64 {
        self.contamination
    }

    /// Continuous score per row; lower is more anomalous.
    pub fn score(&self, embeddings: &[Vec<f32>]) -> Result<Vec<f64>> {
        embeddings
            .iter()
            .map(|row| {
                check_dimension(self.dimension, row.len())?;
                let point: Vec<f64> = row.iter().map(|&v| f64::from(v)).collect();
                Ok(self.forest.score(&point))
            })
            .collect()
    }

    /// `true` for rows scoring below the threshold.
    pub fn predict(&self, embeddings: &[Vec<f32>]) -> Result<Vec<bool>> {
        Ok(self
            .score(embeddings)?
            .into_iter()
            .map(|s| s < self.threshold)
            .collect())
    }

    /// Score and flag in one pass.
    pub fn verdicts(&self, embeddings: &[Vec<f32>]) -> Result<Vec<AnomalyVerdict>> {
        Ok(self
            .score(embeddings)?
            .into_iter()
            .map(|score| AnomalyVerdict {
                is_anomaly: score < self.threshold,
                score,
            })
            .collect())
    }

    /// Flagged samples of `snapshot`, most anomalous first.
    pub fn get_anomalies(&self, snapshot: &CorpusSnapshot) -> Result<Vec<FlaggedSample>> {
        let verdicts = self.verdicts(&snapshot.embeddings)?;
        let mut flagged: Vec<FlaggedSample> = verdicts
            .into_iter()
            .zip(snapshot.ids.iter().zip(&snapshot.metadata))
            .filter(|(verdict, _)| verdict.is_anomaly)
            .map(|(verdict, (id, metadata))| FlaggedSample {
                id: *id,
                metadata: metadata.clone(),
                score: verdict.score,
            })
            .collect();
        flagged.sort_by(|a, b| a.score.total_cmp(&b.score));
        Ok(flagged)
    }

    pub fn to_blob(&self) -> Result<Vec<u8>> {
        blob::encode(BLOB_KIND, self)
    }

    pub fn from_blob(bytes: &[u8]) -> Result<Self> {
        blob::decode(BLOB_KIND, bytes)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        blob::save(path, &self.to_blob()?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_blob(&std::fs::read(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn corpus() -> Vec<Vec<f32>> {
        let mut rng = StdRng::seed_from_u64(3);
        let mut rows: Vec<Vec<f32>> = (0..60)
            .map(|_| (0..4).map(|_| rng.random_range(-1.0..1.0)).collect())
            .collect();
        rows.push(vec![25.0, -25.0, 25.0, -25.0]);
        rows
    }

    #[test]
    fn test_contamination_bounds() {
        for bad in [0.0, -0.1, 0.6, f64::NAN] {
            let config = AnomalyConfig {
                contamination: bad,
                ..AnomalyConfig::default()
            };
            assert!(AnomalyScorer::new(config).is_err(), "{bad} accepted");
        }
        let config = AnomalyConfig {
            contamination: 0.5,
            ..AnomalyConfig::default()
        };
        assert!(AnomalyScorer::new(config).is_ok());
    }

    #[test]
    fn test_far_point_is_flagged_first() {
        let rows = corpus();
        let model = AnomalyScorer::new(AnomalyConfig::default())
            .unwrap()
            .fit(&rows)
            .unwrap();
        let flags = model.predict(&rows).unwrap();
        assert!(flags[60]);

        let scores = model.score(&rows).unwrap();
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        assert!((scores[60] - min).abs() < 1e-12);
    }

    #[test]
    fn test_flagged_share_near_contamination() {
        let rows = corpus();
        let model = AnomalyScorer::new(AnomalyConfig::default())
            .unwrap()
            .fit(&rows)
            .unwrap();
        let flagged = model.predict(&rows).unwrap().iter().filter(|&&f| f).count();
        assert!((3..=9).contains(&flagged), "flagged {flagged}");
    }

    #[test]
    fn test_empty_corpus() {
        let scorer = AnomalyScorer::new(AnomalyConfig::default()).unwrap();
        assert!(matches!(scorer.fit(&[]), Err(Error::CorpusEmpty)));
    }

    #[test]
    fn test_blob_round_trip() {
        let rows = corpus();
        let model = AnomalyScorer::new(AnomalyConfig::default())
            .unwrap()
            .fit(&rows)
            .unwrap();
        let restored = AnomalyModel::from_blob(&model.to_blob().unwrap()).unwrap();
        assert_eq!(restored.score(&rows).unwrap(), model.score(&rows).unwrap());
    }
}
