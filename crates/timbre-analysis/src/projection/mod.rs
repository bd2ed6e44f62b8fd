//! Low-dimensional projections of the corpus for visualization.
//!
//! Both methods are stochastic and lossy: they keep local neighborhoods
//! roughly intact but not distances. There is no transform for new points;
//! adding samples means refitting.

mod tsne;
mod umap;

use serde::{Deserialize, Serialize};

use timbre_core::{Deadline, Error, Result};

use crate::matrix::to_f64_rows;

/// Projection algorithm and its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ProjectionMethod {
    /// Exact t-SNE.
    Probabilistic { perplexity: f64, iterations: usize },
    /// UMAP-style fuzzy-graph layout.
    Graph { neighbors: usize, min_dist: f64 },
}

impl Default for ProjectionMethod {
    fn default() -> Self {
        Self::Probabilistic {
            perplexity: 30.0,
            iterations: 1000,
        }
    }
}

impl ProjectionMethod {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Probabilistic { .. } => "tsne",
            Self::Graph { .. } => "umap",
        }
    }
}

/// `rows.len()` points of `dimension` coordinates each, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    dimension: usize,
    rows: Vec<Vec<f32>>,
}

impl Projection {
    pub fn new(dimension: usize, rows: Vec<Vec<f32>>) -> Result<Self> {
        if let Some(bad) = rows.iter().find(|r| r.len() != dimension) {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }
        Ok(Self { dimension, rows })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[f32]> {
        self.rows.get(index).map(Vec::as_slice)
    }
}

#[derive(Debug, Clone)]
pub struct ProjectionEngine {
    method: ProjectionMethod,
    seed: u64,
}

impl ProjectionEngine {
    pub fn new(method: ProjectionMethod, seed: u64) -> Self {
        Self { method, seed }
    }

    pub fn method(&self) -> ProjectionMethod {
        self.method
    }

    /// Map `embeddings` to `target_dimension` (2 or 3) coordinates per row.
    ///
    /// The deadline is checked once per optimisation step; when it fires the
    /// fit is abandoned with `Timeout` or `Cancelled`. An empty corpus fails
    /// with `CorpusEmpty`; a single row maps to the origin.
    pub fn fit_transform(
        &self,
        embeddings: &[Vec<f32>],
        target_dimension: usize,
        deadline: &Deadline,
    ) -> Result<Projection> {
        if !(2..=3).contains(&target_dimension) {
            return Err(Error::invalid(format!(
                "projection dimension must be 2 or 3, got {target_dimension}"
            )));
        }
        if embeddings.is_empty() {
            return Err(Error::CorpusEmpty);
        }
        if embeddings.len() == 1 {
            return Projection::new(target_dimension, vec![vec![0.0; target_dimension]]);
        }
        let (points, _) = to_f64_rows(embeddings)?;

        let coords = match self.method {
            ProjectionMethod::Probabilistic {
                perplexity,
                iterations,
            } => tsne::fit(
                &points,
                &tsne::TsneParams {
                    target_dimension,
                    perplexity,
                    iterations,
                    seed: self.seed,
                },
                deadline,
            )?,
            ProjectionMethod::Graph {
                neighbors,
                min_dist,
            } => umap::fit(
                &points,
                &umap::UmapParams {
                    target_dimension,
                    neighbors,
                    min_dist,
                    seed: self.seed,
                },
                deadline,
            )?,
        };

        log::info!(
            "Projected {} samples to {}D with {}",
            points.len(),
            target_dimension,
            self.method.name()
        );

        #[allow(clippy::cast_possible_truncation)]
        let rows = coords
            .into_iter()
            .map(|row| row.into_iter().map(|v| v as f32).collect())
            .collect();
        Projection::new(target_dimension, rows)
    }
}
