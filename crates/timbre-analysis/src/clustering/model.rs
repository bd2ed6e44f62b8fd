use serde::{Deserialize, Serialize};
use std::path::Path;

use timbre_core::model::ClusterLabel;
use timbre_core::{Error, Result};

use super::kmeans::nearest_centroid;
use crate::blob;
use crate::matrix::check_dimension;

const BLOB_KIND: &str = "cluster_model";

/// A fitted partition that can be persisted and reloaded.
///
/// Only centroid fits generalise to new points; a density fit records its
/// parameters for provenance but refuses `predict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ClusterModel {
    Centroid {
        dimension: usize,
        centroids: Vec<Vec<f64>>,
    },
    Density {
        dimension: usize,
        eps: f64,
        min_points: usize,
    },
}

impl ClusterModel {
    pub const fn dimension(&self) -> usize {
        match self {
            Self::Centroid { dimension, .. } | Self::Density { dimension, .. } => *dimension,
        }
    }

    /// Whether `predict` is available.
    pub const fn can_predict(&self) -> bool {
        matches!(self, Self::Centroid { .. })
    }

    /// Number of clusters, for centroid fits.
    pub fn cluster_count(&self) -> Option<usize> {
        match self {
            Self::Centroid { centroids, .. } => Some(centroids.len()),
            Self::Density { .. } => None,
        }
    }

    /// Assign one embedding to its nearest centroid.
    pub fn assign(&self, embedding: &[f32]) -> Result<ClusterLabel> {
        match self {
            Self::Centroid {
                dimension,
                centroids,
            } => {
                check_dimension(*dimension, embedding.len())?;
                let point: Vec<f64> = embedding.iter().map(|&v| f64::from(v)).collect();
                let (idx, _) = nearest_centroid(&point, centroids);
                let idx = u32::try_from(idx)
                    .map_err(|_| Error::invalid("cluster index out of range"))?;
                Ok(ClusterLabel::Cluster(idx))
            }
            Self::Density { .. } => Err(Error::UnsupportedOperation(
                "predict is not defined for a density-based fit".to_string(),
            )),
        }
    }

    /// Assign each embedding to its nearest centroid.
    pub fn predict(&self, embeddings: &[Vec<f32>]) -> Result<Vec<ClusterLabel>> {
        embeddings.iter().map(|e| self.assign(e)).collect()
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

    fn centroid_model() -> ClusterModel {
        ClusterModel::Centroid {
            dimension: 2,
            centroids: vec![vec![0.0, 0.0], vec![1.0 / 3.0, 10.0]],
        }
    }

    #[test]
    fn test_assign_nearest() {
        let model = centroid_model();
        assert_eq!(model.assign(&[0.1, 0.2]).unwrap(), ClusterLabel::Cluster(0));
        assert_eq!(model.assign(&[0.0, 9.0]).unwrap(), ClusterLabel::Cluster(1));
    }

    #[test]
    fn test_assign_wrong_dimension() {
        assert!(matches!(
            centroid_model().assign(&[0.0, 0.0, 0.0]),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_density_model_refuses_predict() {
        let model = ClusterModel::Density {
            dimension: 2,
            eps: 0.5,
            min_points: 5,
        };
        assert!(!model.can_predict());
        assert!(matches!(
            model.predict(&[vec![0.0, 0.0]]),
            Err(Error::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_blob_round_trip_is_exact() {
        let model = centroid_model();
        let restored = ClusterModel::from_blob(&model.to_blob().unwrap()).unwrap();
        assert_eq!(restored, model);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("models").join("clusterer.json");
        let model = centroid_model();
        model.save(&path).unwrap();
        assert_eq!(ClusterModel::load(&path).unwrap(), model);
    }
}
