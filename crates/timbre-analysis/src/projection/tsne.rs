//! Exact t-SNE (O(n²) per iteration).

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use timbre_core::{Deadline, Error, Result};

use crate::matrix::squared_distance;

const EARLY_EXAGGERATION: f64 = 12.0;
const EXAGGERATION_ITERATIONS: usize = 250;
const MIN_GAIN: f64 = 0.01;
const PERPLEXITY_STEPS: usize = 50;
const PERPLEXITY_TOLERANCE: f64 = 1e-5;

#[derive(Debug, Clone)]
pub(crate) struct TsneParams {
    pub target_dimension: usize,
    pub perplexity: f64,
    pub iterations: usize,
    pub seed: u64,
}

pub(crate) fn fit(points: &[Vec<f64>], params: &TsneParams, deadline: &Deadline) -> Result<Vec<Vec<f64>>> {
    let n = points.len();
    let dims = params.target_dimension;

    // A perplexity near n leaves nothing to calibrate against.
    #[allow(clippy::cast_precision_loss)]
    let perplexity = params.perplexity.min((n - 1) as f64 / 3.0).max(1.0);
    if perplexity < params.perplexity {
        log::debug!(
            "Perplexity clamped from {} to {:.2} for {} samples",
            params.perplexity,
            perplexity,
            n
        );
    }

    let p = joint_probabilities(points, perplexity);

    let mut rng = StdRng::seed_from_u64(params.seed);
    let normal = Normal::new(0.0, 1e-4)
        .map_err(|e| Error::invalid(format!("t-SNE initialisation: {e}")))?;
    let mut y: Vec<Vec<f64>> = (0..n)
        .map(|_| (0..dims).map(|_| normal.sample(&mut rng)).collect())
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let learning_rate = (n as f64 / EARLY_EXAGGERATION / 4.0).max(50.0);
    let mut update = vec![vec![0.0; dims]; n];
    let mut gains = vec![vec![1.0_f64; dims]; n];
    let mut num = vec![vec![0.0; n]; n];

    for iteration in 0..params.iterations {
        deadline.check("projection")?;

        let (exaggeration, momentum) = if iteration < EXAGGERATION_ITERATIONS {
            (EARLY_EXAGGERATION, 0.5)
        } else {
            (1.0, 0.8)
        };

        // Student-t kernel in the low-dimensional space.
        let mut sum_num = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                let q = 1.0 / (1.0 + squared_distance(&y[i], &y[j]));
                num[i][j] = q;
                num[j][i] = q;
                sum_num += 2.0 * q;
            }
        }
        let sum_num = sum_num.max(f64::MIN_POSITIVE);

        for i in 0..n {
            let mut grad = vec![0.0; dims];
            for j in 0..n {
                if i == j {
                    continue;
                }
                let q = (num[i][j] / sum_num).max(1e-12);
                let mult = (exaggeration * p[i][j] - q) * num[i][j];
                for (g, (yi, yj)) in grad.iter_mut().zip(y[i].iter().zip(&y[j])) {
                    *g += 4.0 * mult * (yi - yj);
                }
            }

            for d in 0..dims {
                let same_sign = (grad[d] > 0.0) == (update[i][d] > 0.0);
                gains[i][d] = if same_sign {
                    (gains[i][d] * 0.8).max(MIN_GAIN)
                } else {
                    gains[i][d] + 0.2
                };
                update[i][d] = momentum * update[i][d] - learning_rate * gains[i][d] * grad[d];
            }
        }

        for (row, step) in y.iter_mut().zip(&update) {
            for (v, s) in row.iter_mut().zip(step) {
                *v += s;
            }
        }
        recenter(&mut y, dims);
    }

    Ok(y)
}

/// Symmetrised input affinities `P_ij = (p_j|i + p_i|j) / 2n`.
fn joint_probabilities(points: &[Vec<f64>], perplexity: f64) -> Vec<Vec<f64>> {
    let n = points.len();
    let distances: Vec<Vec<f64>> = points
        .iter()
        .map(|a| points.iter().map(|b| squared_distance(a, b)).collect())
        .collect();

    let target_entropy = perplexity.ln();
    let mut conditional = vec![vec![0.0; n]; n];
    for i in 0..n {
        conditional[i] = conditional_row(&distances[i], i, target_entropy);
    }

    #[allow(clippy::cast_precision_loss)]
    let scale = 2.0 * n as f64;
    let mut joint = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            if i != j {
                joint[i][j] = ((conditional[i][j] + conditional[j][i]) / scale).max(1e-12);
            }
        }
    }
    joint
}

/// Binary search on the Gaussian precision so row `i` reaches the target entropy.
fn conditional_row(distances: &[f64], i: usize, target_entropy: f64) -> Vec<f64> {
    let n = distances.len();
    let mut beta = 1.0;
    let mut beta_min = f64::NEG_INFINITY;
    let mut beta_max = f64::INFINITY;
    let mut row = vec![0.0; n];

    for _ in 0..PERPLEXITY_STEPS {
        let mut sum = 0.0;
        let mut weighted = 0.0;
        for j in 0..n {
            row[j] = if j == i {
                0.0
            } else {
                (-distances[j] * beta).exp()
            };
            sum += row[j];
            weighted += distances[j] * row[j];
        }
        let sum = sum.max(f64::MIN_POSITIVE);
        let entropy = sum.ln() + beta * weighted / sum;
        let diff = entropy - target_entropy;
        if diff.abs() < PERPLEXITY_TOLERANCE {
            break;
        }
        if diff > 0.0 {
            beta_min = beta;
            beta = if beta_max.is_finite() {
                (beta + beta_max) / 2.0
            } else {
                beta * 2.0
            };
        } else {
            beta_max = beta;
            beta = if beta_min.is_finite() {
                (beta + beta_min) / 2.0
            } else {
                beta / 2.0
            };
        }
    }

    let sum: f64 = row.iter().sum();
    if sum > 0.0 {
        for v in &mut row {
            *v /= sum;
        }
    }
    row
}

fn recenter(y: &mut [Vec<f64>], dims: usize) {
    #[allow(clippy::cast_precision_loss)]
    let n = y.len() as f64;
    for d in 0..dims {
        let mean = y.iter().map(|row| row[d]).sum::<f64>() / n;
        for row in y.iter_mut() {
            row[d] -= mean;
        }
    }
}
