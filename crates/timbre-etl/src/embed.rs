//! Per-vector standardization of feature vectors.

use std::sync::OnceLock;

use timbre_core::model::{Embedding, FeatureVector};
use timbre_core::{Error, Result};

const EPSILON: f64 = 1e-8;

/// Maps a [`FeatureVector`] to `(x - mean) / (std + 1e-8)` over its own components.
///
/// The first vector seen fixes the expected length for the lifetime of the
/// embedder; later vectors of another length fail with `DimensionMismatch`.
/// A constant vector standardizes to all zeros.
#[derive(Debug, Default)]
pub struct Embedder {
    dimension: OnceLock<usize>,
}

impl Embedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// An embedder already bound to an existing corpus dimension.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: OnceLock::from(dimension),
        }
    }

    /// The established length, once known.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension.get().copied()
    }

    pub fn embed(&self, features: &FeatureVector) -> Result<Embedding> {
        if features.is_empty() {
            return Err(Error::invalid("cannot embed an empty feature vector"));
        }
        let expected = *self.dimension.get_or_init(|| features.len());
        if features.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: features.len(),
            });
        }

        let values = features.as_slice();
        #[allow(clippy::cast_precision_loss)]
        let n = values.len() as f64;
        let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
        let variance = values
            .iter()
            .map(|&v| (f64::from(v) - mean).powi(2))
            .sum::<f64>()
            / n;
        let scale = variance.sqrt() + EPSILON;

        #[allow(clippy::cast_possible_truncation)]
        let standardized = values
            .iter()
            .map(|&v| ((f64::from(v) - mean) / scale) as f32)
            .collect();
        Ok(Embedding::new(standardized))
    }

    /// One result per input, in input order; items are standardized independently.
    pub fn embed_batch(&self, batch: &[FeatureVector]) -> Vec<Result<Embedding>> {
        batch.iter().map(|features| self.embed(features)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stats(values: &[f32]) -> (f64, f64) {
        #[allow(clippy::cast_precision_loss)]
        let n = values.len() as f64;
        let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
        let var = values
            .iter()
            .map(|&v| (f64::from(v) - mean).powi(2))
            .sum::<f64>()
            / n;
        (mean, var.sqrt())
    }

    #[test]
    fn test_first_vector_fixes_dimension() {
        let embedder = Embedder::new();
        assert_eq!(embedder.dimension(), None);
        embedder.embed(&FeatureVector::new(vec![1.0, 2.0, 3.0])).unwrap();
        assert_eq!(embedder.dimension(), Some(3));

        let err = embedder
            .embed(&FeatureVector::new(vec![1.0, 2.0]))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_with_dimension_guards_from_the_start() {
        let embedder = Embedder::with_dimension(45);
        assert!(embedder.embed(&FeatureVector::new(vec![0.5; 44])).is_err());
    }

    #[test]
    fn test_constant_vector_maps_to_zeros() {
        let embedding = Embedder::new()
            .embed(&FeatureVector::new(vec![7.0; 10]))
            .unwrap();
        assert!(embedding.as_slice().iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_empty_vector_is_rejected() {
        assert!(Embedder::new().embed(&FeatureVector::new(Vec::new())).is_err());
    }

    #[test]
    fn test_batch_keeps_order_and_failures() {
        let embedder = Embedder::new();
        let results = embedder.embed_batch(&[
            FeatureVector::new(vec![1.0, 2.0, 3.0]),
            FeatureVector::new(vec![1.0]),
            FeatureVector::new(vec![3.0, 2.0, 1.0]),
        ]);
        assert_eq!(results.len(), 3);
        assert!(results[1].is_err());
        let first = results[0].as_ref().unwrap().as_slice().to_vec();
        let last = results[2].as_ref().unwrap().as_slice().to_vec();
        assert!(first[0] < 0.0 && last[0] > 0.0);
    }

    proptest! {
        #[test]
        fn test_standardized_mean_and_std(
            values in proptest::collection::vec(-1000.0_f32..1000.0, 45),
        ) {
            let (_, raw_std) = stats(&values);
            prop_assume!(raw_std > 1e-3);

            let embedding = Embedder::new().embed(&FeatureVector::new(values)).unwrap();
            prop_assert_eq!(embedding.len(), 45);
            let (mean, std) = stats(embedding.as_slice());
            prop_assert!(mean.abs() < 0.1, "mean {}", mean);
            prop_assert!((std - 1.0).abs() < 0.1, "std {}", std);
        }
    }
}
