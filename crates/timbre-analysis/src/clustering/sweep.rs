use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

use timbre_core::{Error, Result};

use super::{ClusterConfig, ClusterMethod, ClusteringEngine};

/// Quality of a centroid partition at one K.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KPoint {
    pub k: usize,
    pub silhouette: Option<f64>,
    pub inertia: f64,
}

/// The silhouette/inertia curve over a K range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KSweep {
    pub points: Vec<KPoint>,
}

impl KSweep {
    /// K with the highest silhouette; the smallest such K on ties.
    pub fn best_k(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for point in &self.points {
            if let Some(s) = point.silhouette {
                if best.is_none_or(|(_, b)| s > b) {
                    best = Some((point.k, s));
                }
            }
        }
        best.map(|(k, _)| k)
    }
}

/// Refit a centroid partition at every K in `k_range` and record its quality.
///
/// Values of K larger than the corpus are skipped. The other settings
/// (seed, restarts, iterations) come from `config`.
pub fn find_optimal_k(
    embeddings: &[Vec<f32>],
    k_range: RangeInclusive<usize>,
    config: &ClusterConfig,
) -> Result<KSweep> {
    if embeddings.is_empty() {
        return Err(Error::CorpusEmpty);
    }
    if k_range.is_empty() || *k_range.start() == 0 {
        return Err(Error::invalid(format!(
            "invalid K range {}..={}",
            k_range.start(),
            k_range.end()
        )));
    }

    let mut sweep = KSweep::default();
    for k in k_range {
        if k > embeddings.len() {
            log::debug!("Skipping k={}: only {} samples", k, embeddings.len());
            break;
        }
        let engine = ClusteringEngine::new(
            config
                .clone()
                .with_method(ClusterMethod::CentroidPartition { k }),
        );
        let fit = engine.fit(embeddings)?;
        log::info!(
            "k={}: silhouette {:?}, inertia {:.3}",
            k,
            fit.metrics.silhouette,
            fit.metrics.inertia.unwrap_or(0.0)
        );
        sweep.points.push(KPoint {
            k,
            silhouette: fit.metrics.silhouette,
            inertia: fit.metrics.inertia.unwrap_or(0.0),
        });
    }
    Ok(sweep)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_blobs() -> Vec<Vec<f32>> {
        let centers = [(0.0_f32, 0.0_f32), (30.0, 0.0), (0.0, 30.0), (30.0, 30.0)];
        let mut rows = Vec::new();
        for (cx, cy) in centers {
            for i in 0..8_u8 {
                let t = f32::from(i) * 0.1;
                rows.push(vec![cx + t, cy + t * 0.5]);
            }
        }
        rows
    }

    #[test]
    fn test_sweep_picks_true_k() {
        let sweep = find_optimal_k(&four_blobs(), 2..=6, &ClusterConfig::default()).unwrap();
        assert_eq!(sweep.points.len(), 5);
        assert_eq!(sweep.best_k(), Some(4));
        assert!(sweep.points[0].inertia > sweep.points[2].inertia);
    }

    #[test]
    fn test_sweep_stops_at_corpus_size() {
        let rows = vec![vec![0.0], vec![1.0], vec![5.0]];
        let sweep = find_optimal_k(&rows, 2..=10, &ClusterConfig::default()).unwrap();
        assert_eq!(sweep.points.len(), 2);
        // k == n leaves every point alone, so no silhouette.
        assert!(sweep.points[1].silhouette.is_none());
    }

    #[test]
    fn test_sweep_rejects_empty_range() {
        let rows = vec![vec![0.0], vec![1.0]];
        #[allow(clippy::reversed_empty_ranges)]
        let err = find_optimal_k(&rows, 5..=2, &ClusterConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }
}
