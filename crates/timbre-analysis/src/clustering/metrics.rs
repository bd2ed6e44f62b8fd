//! Post-fit quality scores.
//!
//! Both scores are computed over every point, with noise scored as its own
//! `-1` group. When fewer than two distinct labels result, or every point
//! carries its own label, the score is left out rather than failing the
//! analysis.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use timbre_core::model::ClusterLabel;

use crate::matrix::{distance, mean_row, pairwise_distances};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMetrics {
    pub cluster_count: usize,
    pub noise_count: usize,
    /// Mean silhouette in `[-1, 1]`; higher is better.
    pub silhouette: Option<f64>,
    /// Davies-Bouldin index; lower is better.
    pub davies_bouldin: Option<f64>,
    /// Sum of squared distances to the assigned centroid (centroid fits only).
    pub inertia: Option<f64>,
}

impl ClusterMetrics {
    pub(crate) fn compute(points: &[Vec<f64>], labels: &[ClusterLabel], inertia: Option<f64>) -> Self {
        let groups = label_groups(labels);
        let noise_count = labels.iter().filter(|l| !l.is_cluster()).count();
        let cluster_count = labels
            .iter()
            .filter_map(|l| l.cluster_index())
            .collect::<BTreeSet<_>>()
            .len();

        let scorable = groups.len() >= 2 && groups.len() < points.len();
        let (silhouette, davies_bouldin) = if scorable {
            let rows: Vec<&Vec<f64>> = points.iter().collect();
            (
                Some(silhouette(&rows, &groups)),
                Some(davies_bouldin(&rows, &groups)),
            )
        } else {
            log::debug!(
                "Quality metrics omitted: {} distinct labels over {} points",
                groups.len(),
                points.len()
            );
            (None, None)
        };

        Self {
            cluster_count,
            noise_count,
            silhouette,
            davies_bouldin,
            inertia,
        }
    }
}

/// Row indices per wire label; noise and unassigned points share `-1`.
fn label_groups(labels: &[ClusterLabel]) -> BTreeMap<i64, Vec<usize>> {
    let mut groups: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        groups.entry(label.wire_id()).or_default().push(i);
    }
    groups
}

/// Mean silhouette coefficient. Singleton clusters contribute zero.
pub(crate) fn silhouette(points: &[&Vec<f64>], clusters: &BTreeMap<i64, Vec<usize>>) -> f64 {
    let owned: Vec<Vec<f64>> = points.iter().map(|p| (*p).clone()).collect();
    let dist = pairwise_distances(&owned);

    let mut total = 0.0;
    for (cluster, indices) in clusters {
        for &i in indices {
            if indices.len() == 1 {
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let a = indices.iter().map(|&j| dist[i][j]).sum::<f64>() / (indices.len() - 1) as f64;
            let b = clusters
                .iter()
                .filter(|(other, _)| *other != cluster)
                .map(|(_, others)| {
                    #[allow(clippy::cast_precision_loss)]
                    let mean = others.iter().map(|&j| dist[i][j]).sum::<f64>() / others.len() as f64;
                    mean
                })
                .fold(f64::INFINITY, f64::min);
            let denom = a.max(b);
            if denom > 0.0 {
                total += (b - a) / denom;
            }
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let n = points.len() as f64;
    total / n
}

/// Davies-Bouldin index: mean over clusters of the worst scatter/separation ratio.
pub(crate) fn davies_bouldin(points: &[&Vec<f64>], clusters: &BTreeMap<i64, Vec<usize>>) -> f64 {
    let dim = points.first().map_or(0, |p| p.len());
    let summary: Vec<(Vec<f64>, f64)> = clusters
        .values()
        .map(|indices| {
            let centroid = mean_row(indices.iter().map(|&i| points[i]), dim);
            #[allow(clippy::cast_precision_loss)]
            let scatter = indices
                .iter()
                .map(|&i| distance(points[i], &centroid))
                .sum::<f64>()
                / indices.len() as f64;
            (centroid, scatter)
        })
        .collect();

    let mut total = 0.0;
    for (i, (ci, si)) in summary.iter().enumerate() {
        let worst = summary
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, (cj, sj))| {
                let separation = distance(ci, cj);
                if separation > 0.0 {
                    (si + sj) / separation
                } else {
                    0.0
                }
            })
            .fold(0.0, f64::max);
        total += worst;
    }
    #[allow(clippy::cast_precision_loss)]
    let k = summary.len() as f64;
    total / k
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_groups() -> (Vec<Vec<f64>>, Vec<ClusterLabel>) {
        let points = vec![
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![10.0, 0.0],
            vec![10.0, 1.0],
        ];
        let labels = vec![
            ClusterLabel::Cluster(0),
            ClusterLabel::Cluster(0),
            ClusterLabel::Cluster(1),
            ClusterLabel::Cluster(1),
        ];
        (points, labels)
    }

    #[test]
    fn test_well_separated_scores() {
        let (points, labels) = two_groups();
        let metrics = ClusterMetrics::compute(&points, &labels, Some(1.0));
        assert_eq!(metrics.cluster_count, 2);
        let s = metrics.silhouette.unwrap();
        assert!(s > 0.85 && s <= 1.0, "silhouette {s}");
        let db = metrics.davies_bouldin.unwrap();
        assert!(db < 0.2, "davies-bouldin {db}");
    }

    #[test]
    fn test_single_cluster_omits_scores() {
        let points = vec![vec![0.0], vec![1.0], vec![2.0]];
        let labels = vec![ClusterLabel::Cluster(0); 3];
        let metrics = ClusterMetrics::compute(&points, &labels, None);
        assert!(metrics.silhouette.is_none());
        assert!(metrics.davies_bouldin.is_none());
    }

    #[test]
    fn test_noise_counts_as_its_own_label() {
        let (mut points, mut labels) = two_groups();
        points.push(vec![500.0, 500.0]);
        labels.push(ClusterLabel::Noise);
        let metrics = ClusterMetrics::compute(&points, &labels, None);
        assert_eq!(metrics.noise_count, 1);
        assert_eq!(metrics.cluster_count, 2);
        assert!(metrics.silhouette.unwrap() > 0.5);
    }

    #[test]
    fn test_one_cluster_plus_noise_is_scored() {
        let mut points: Vec<Vec<f64>> = (0..10).map(|i| vec![f64::from(i) * 0.1, 0.0]).collect();
        let mut labels = vec![ClusterLabel::Cluster(0); 10];
        points.push(vec![50.0, 50.0]);
        points.push(vec![-50.0, 50.0]);
        labels.extend([ClusterLabel::Noise, ClusterLabel::Noise]);

        let metrics = ClusterMetrics::compute(&points, &labels, None);
        assert_eq!(metrics.cluster_count, 1);
        assert_eq!(metrics.noise_count, 2);
        let s = metrics.silhouette.expect("two distinct labels are scorable");
        assert!((-1.0..=1.0).contains(&s));
        assert!(metrics.davies_bouldin.is_some());
    }

    #[test]
    fn test_all_noise_omits_scores() {
        let points = vec![vec![0.0], vec![5.0], vec![9.0]];
        let labels = vec![ClusterLabel::Noise; 3];
        let metrics = ClusterMetrics::compute(&points, &labels, None);
        assert_eq!(metrics.cluster_count, 0);
        assert!(metrics.silhouette.is_none());
    }
}
