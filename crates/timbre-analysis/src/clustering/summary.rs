use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use timbre_core::model::{ClusterLabel, SampleMetadata};
use timbre_core::{Error, Result};

use crate::projection::Projection;

/// How many example filenames a summary keeps per cluster.
pub const EXAMPLES_PER_CLUSTER: usize = 5;

/// Read-only description of one cluster for the serving layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub size: usize,
    pub genres: BTreeMap<String, usize>,
    pub examples: Vec<String>,
}

/// Where a cluster sits in a projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedCentroid {
    pub size: usize,
    pub centroid: Vec<f64>,
    /// Per-axis population standard deviation.
    pub spread: Vec<f64>,
    /// Mean distance of members from the centroid.
    pub mean_radius: f64,
}

/// Group samples by cluster, keyed by wire id (noise and unassigned under `-1`).
pub fn summarize_clusters(
    labels: &[ClusterLabel],
    metadata: &[SampleMetadata],
) -> Result<BTreeMap<i64, ClusterSummary>> {
    if labels.len() != metadata.len() {
        return Err(Error::invalid(format!(
            "{} labels for {} samples",
            labels.len(),
            metadata.len()
        )));
    }

    let mut summaries: BTreeMap<i64, ClusterSummary> = BTreeMap::new();
    for (label, meta) in labels.iter().zip(metadata) {
        let summary = summaries
            .entry(label.wire_id())
            .or_insert_with(|| ClusterSummary {
                size: 0,
                genres: BTreeMap::new(),
                examples: Vec::new(),
            });
        summary.size += 1;
        *summary.genres.entry(meta.genre.clone()).or_insert(0) += 1;
        if summary.examples.len() < EXAMPLES_PER_CLUSTER {
            summary.examples.push(meta.filename.clone());
        }
    }
    Ok(summaries)
}

/// Centroid, spread and mean radius of each cluster in projection space.
///
/// Noise has no meaningful center and is left out.
pub fn projected_centroids(
    labels: &[ClusterLabel],
    projection: &Projection,
) -> Result<BTreeMap<u32, ProjectedCentroid>> {
    if labels.len() != projection.len() {
        return Err(Error::invalid(format!(
            "{} labels for {} projected rows",
            labels.len(),
            projection.len()
        )));
    }

    let dim = projection.dimension();
    let mut groups: BTreeMap<u32, Vec<Vec<f64>>> = BTreeMap::new();
    for (label, row) in labels.iter().zip(projection.rows()) {
        if let Some(cluster) = label.cluster_index() {
            groups
                .entry(cluster)
                .or_default()
                .push(row.iter().map(|&v| f64::from(v)).collect());
        }
    }

    Ok(groups
        .into_iter()
        .map(|(cluster, members)| {
            #[allow(clippy::cast_precision_loss)]
            let n = members.len() as f64;
            let centroid = crate::matrix::mean_row(&members, dim);
            let spread = (0..dim)
                .map(|axis| {
                    let var = members
                        .iter()
                        .map(|m| (m[axis] - centroid[axis]).powi(2))
                        .sum::<f64>()
                        / n;
                    var.sqrt()
                })
                .collect();
            let mean_radius = members
                .iter()
                .map(|m| crate::matrix::distance(m, &centroid))
                .sum::<f64>()
                / n;
            (
                cluster,
                ProjectedCentroid {
                    size: members.len(),
                    centroid,
                    spread,
                    mean_radius,
                },
            )
        })
        .collect())
}
