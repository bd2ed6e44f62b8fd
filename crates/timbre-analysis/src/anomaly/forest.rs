//! Isolation forest.
//!
//! Each tree isolates points of a random subsample by recursive random
//! splits. Outliers are isolated in fewer splits, so their average path
//! length across trees is short.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn build(points: &[Vec<f64>], sample: Vec<usize>, height_limit: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(points, sample, 0, height_limit, rng);
        tree
    }

    /// Append the subtree for `indices` and return its node index.
    fn grow(
        &mut self,
        points: &[Vec<f64>],
        indices: Vec<usize>,
        depth: usize,
        height_limit: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        if depth >= height_limit || indices.len() <= 1 {
            self.nodes.push(Node::Leaf {
                size: indices.len(),
            });
            return id;
        }

        // Only features that vary within this node can split it.
        let dim = points[indices[0]].len();
        let ranges: Vec<(usize, f64, f64)> = (0..dim)
            .filter_map(|feature| {
                let (lo, hi) = indices.iter().fold(
                    (f64::INFINITY, f64::NEG_INFINITY),
                    |(lo, hi), &i| (lo.min(points[i][feature]), hi.max(points[i][feature])),
                );
                (hi > lo).then_some((feature, lo, hi))
            })
            .collect();
        if ranges.is_empty() {
            self.nodes.push(Node::Leaf {
                size: indices.len(),
            });
            return id;
        }

        let (feature, lo, hi) = ranges[rng.random_range(0..ranges.len())];
        let threshold = rng.random_range(lo..hi);
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| points[i][feature] < threshold);

        // Placeholder, patched once both children exist.
        self.nodes.push(Node::Leaf { size: 0 });
        let left = self.grow(points, left_idx, depth + 1, height_limit, rng);
        let right = self.grow(points, right_idx, depth + 1, height_limit, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn path_length(&self, point: &[f64]) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[node] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if point[*feature] < *threshold { *left } else { *right };
                    depth += 1.0;
                }
                Node::Leaf { size } => return depth + average_path_length(*size),
            }
        }
    }
}

/// Average path length of an unsuccessful binary-search-tree lookup over `n` points.
pub(crate) fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            #[allow(clippy::cast_precision_loss)]
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
}

impl IsolationForest {
    pub(crate) fn fit(
        points: &[Vec<f64>],
        n_estimators: usize,
        max_samples: usize,
        rng: &mut StdRng,
    ) -> Self {
        let n = points.len();
        let sample_size = max_samples.min(n).max(1);
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let height_limit = (sample_size as f64).log2().ceil().max(0.0) as usize;

        let trees = (0..n_estimators.max(1))
            .map(|_| {
                let sample = rand::seq::index::sample(rng, n, sample_size).into_vec();
                IsolationTree::build(points, sample, height_limit, rng)
            })
            .collect();

        Self { trees, sample_size }
    }

    /// `-2^(-E[h(x)] / c(psi))`; lower is more anomalous, range `[-1, 0)`.
    pub(crate) fn score(&self, point: &[f64]) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let mean_path = self
            .trees
            .iter()
            .map(|tree| tree.path_length(point))
            .sum::<f64>()
            / self.trees.len() as f64;
        let norm = average_path_length(self.sample_size);
        let norm = if norm > 0.0 { norm } else { 1.0 };
        -(2.0_f64.powf(-mean_path / norm))
    }
}
