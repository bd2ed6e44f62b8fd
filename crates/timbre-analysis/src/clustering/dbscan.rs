//! Density-based partitioning (DBSCAN, Euclidean).

use std::collections::VecDeque;

use timbre_core::model::ClusterLabel;

use crate::matrix::squared_distance;

/// Label every point as a cluster member or noise.
///
/// A point is a core point when at least `min_points` points (itself
/// included) lie within `eps`. Clusters are numbered in discovery order.
pub(crate) fn fit(points: &[Vec<f64>], eps: f64, min_points: usize) -> Vec<ClusterLabel> {
    let n = points.len();
    let eps_sq = eps * eps;
    let neighborhoods: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| squared_distance(&points[i], &points[j]) <= eps_sq)
                .collect()
        })
        .collect();
    let is_core: Vec<bool> = neighborhoods
        .iter()
        .map(|nb| nb.len() >= min_points)
        .collect();

    let mut labels: Vec<Option<u32>> = vec![None; n];
    let mut next_cluster = 0_u32;

    for start in 0..n {
        if labels[start].is_some() || !is_core[start] {
            continue;
        }
        let cluster = next_cluster;
        next_cluster += 1;
        labels[start] = Some(cluster);

        let mut queue: VecDeque<usize> = VecDeque::from([start]);
        while let Some(point) = queue.pop_front() {
            if !is_core[point] {
                continue;
            }
            for &neighbor in &neighborhoods[point] {
                if labels[neighbor].is_none() {
                    labels[neighbor] = Some(cluster);
                    queue.push_back(neighbor);
                }
            }
        }
    }

    labels
        .into_iter()
        .map(|label| label.map_or(ClusterLabel::Noise, ClusterLabel::Cluster))
        .collect()
}
