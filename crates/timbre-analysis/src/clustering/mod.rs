//! Partitioning of the embedding corpus.
//!
//! The method is a closed set resolved once from configuration:
//! centroid partitioning (k-means) or density partitioning (DBSCAN). A fit
//! returns labels, quality metrics and a [`ClusterModel`] that the ingestion
//! path can use to place new samples.

mod dbscan;
mod kmeans;
mod metrics;
mod model;
mod summary;
mod sweep;

pub use metrics::ClusterMetrics;
pub use model::ClusterModel;
pub use summary::{projected_centroids, summarize_clusters, ClusterSummary, ProjectedCentroid};
pub use sweep::{find_optimal_k, KPoint, KSweep};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use timbre_core::model::ClusterLabel;
use timbre_core::{Error, Result};

use crate::matrix::to_f64_rows;
use kmeans::KMeansParams;

/// Which partitioning algorithm to run, with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ClusterMethod {
    /// k-means with a pre-chosen cluster count.
    CentroidPartition { k: usize },
    /// DBSCAN with neighborhood radius `eps`; `min_points` includes the point itself.
    DensityPartition { eps: f64, min_points: usize },
}

impl Default for ClusterMethod {
    fn default() -> Self {
        Self::CentroidPartition { k: 6 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub method: ClusterMethod,
    pub seed: u64,
    /// k-means restarts; the lowest inertia wins.
    pub n_init: usize,
    pub max_iterations: usize,
    /// Convergence threshold on centroid movement, relative to data variance.
    pub tolerance: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            method: ClusterMethod::default(),
            seed: 42,
            n_init: 10,
            max_iterations: 300,
            tolerance: 1e-4,
        }
    }
}

impl ClusterConfig {
    /// Same settings with a different method.
    #[must_use]
    pub fn with_method(mut self, method: ClusterMethod) -> Self {
        self.method = method;
        self
    }
}

/// Result of a full-corpus fit.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterFit {
    /// One label per input row, in input order.
    pub labels: Vec<ClusterLabel>,
    pub metrics: ClusterMetrics,
    pub model: ClusterModel,
}

#[derive(Debug, Clone)]
pub struct ClusteringEngine {
    config: ClusterConfig,
}

impl ClusteringEngine {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Partition `embeddings`. Identical input and seed give identical output.
    pub fn fit(&self, embeddings: &[Vec<f32>]) -> Result<ClusterFit> {
        let (points, dimension) = to_f64_rows(embeddings)?;
        let n = points.len();

        let fit = match self.config.method {
            ClusterMethod::CentroidPartition { k } => {
                if k == 0 || k > n {
                    return Err(Error::invalid(format!(
                        "cannot form {k} clusters from {n} samples"
                    )));
                }
                let mut rng = StdRng::seed_from_u64(self.config.seed);
                let result = kmeans::fit(
                    &points,
                    KMeansParams {
                        k,
                        n_init: self.config.n_init,
                        max_iterations: self.config.max_iterations,
                        tolerance: self.config.tolerance,
                    },
                    &mut rng,
                );
                let labels = result
                    .assignments
                    .iter()
                    .map(|&a| u32::try_from(a).map(ClusterLabel::Cluster))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|_| Error::invalid("cluster index out of range"))?;
                let metrics = ClusterMetrics::compute(&points, &labels, Some(result.inertia));
                ClusterFit {
                    labels,
                    metrics,
                    model: ClusterModel::Centroid {
                        dimension,
                        centroids: result.centroids,
                    },
                }
            }
            ClusterMethod::DensityPartition { eps, min_points } => {
                if !(eps.is_finite() && eps > 0.0) || min_points == 0 {
                    return Err(Error::invalid(format!(
                        "density partition needs eps > 0 and min_points >= 1 (got {eps}, {min_points})"
                    )));
                }
                let labels = dbscan::fit(&points, eps, min_points);
                let metrics = ClusterMetrics::compute(&points, &labels, None);
                ClusterFit {
                    labels,
                    metrics,
                    model: ClusterModel::Density {
                        dimension,
                        eps,
                        min_points,
                    },
                }
            }
        };

        log::info!(
            "Clustered {} samples into {} clusters ({} noise), silhouette {}",
            n,
            fit.metrics.cluster_count,
            fit.metrics.noise_count,
            fit.metrics
                .silhouette
                .map_or_else(|| "n/a".to_string(), |s| format!("{s:.3}"))
        );
        Ok(fit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Vec<Vec<f32>> {
        let mut rows = Vec::new();
        for (cx, cy) in [(0.0_f32, 0.0_f32), (20.0, 0.0), (0.0, 20.0)] {
            for i in 0..10_u8 {
                let jitter = f32::from(i) * 0.05;
                rows.push(vec![cx + jitter, cy - jitter]);
            }
        }
        rows
    }

    #[test]
    fn test_centroid_fit_finds_three_groups() {
        let engine = ClusteringEngine::new(
            ClusterConfig::default().with_method(ClusterMethod::CentroidPartition { k: 3 }),
        );
        let fit = engine.fit(&blobs()).unwrap();
        assert_eq!(fit.metrics.cluster_count, 3);
        assert!(fit.metrics.silhouette.unwrap() > 0.9);
        assert!(fit.metrics.inertia.is_some());
        assert!(fit.model.can_predict());
    }

    #[test]
    fn test_k_larger_than_corpus_is_rejected() {
        let engine = ClusteringEngine::new(
            ClusterConfig::default().with_method(ClusterMethod::CentroidPartition { k: 4 }),
        );
        let err = engine.fit(&[vec![0.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn test_empty_corpus() {
        let engine = ClusteringEngine::new(ClusterConfig::default());
        assert!(matches!(engine.fit(&[]), Err(Error::CorpusEmpty)));
    }

    #[test]
    fn test_density_fit_labels_noise() {
        let mut rows = blobs();
        rows.push(vec![100.0, 100.0]);
        let engine = ClusteringEngine::new(ClusterConfig::default().with_method(
            ClusterMethod::DensityPartition {
                eps: 1.0,
                min_points: 3,
            },
        ));
        let fit = engine.fit(&rows).unwrap();
        assert_eq!(fit.metrics.cluster_count, 3);
        assert_eq!(fit.labels.last(), Some(&ClusterLabel::Noise));
        assert!(fit.metrics.inertia.is_none());
        assert!(!fit.model.can_predict());
    }

    #[test]
    fn test_fit_is_deterministic() {
        let engine = ClusteringEngine::new(
            ClusterConfig::default().with_method(ClusterMethod::CentroidPartition { k: 3 }),
        );
        let a = engine.fit(&blobs()).unwrap();
        let b = engine.fit(&blobs()).unwrap();
        assert_eq!(a, b);
    }
}
