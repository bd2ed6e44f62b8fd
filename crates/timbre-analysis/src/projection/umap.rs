//! UMAP-style layout: fuzzy kNN graph optimised with negative sampling.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

use timbre_core::{Deadline, Result};

use crate::matrix::{distance, squared_distance};

const SPREAD: f64 = 1.0;
const NEGATIVE_SAMPLE_RATE: usize = 5;
const SIGMA_STEPS: usize = 64;
const CLIP: f64 = 4.0;
const INIT_RANGE: f64 = 10.0;

#[derive(Debug, Clone)]
pub(crate) struct UmapParams {
    pub target_dimension: usize,
    pub neighbors: usize,
    pub min_dist: f64,
    pub seed: u64,
}

struct Edge {
    head: usize,
    tail: usize,
    epochs_per_sample: f64,
}

pub(crate) fn fit(points: &[Vec<f64>], params: &UmapParams, deadline: &Deadline) -> Result<Vec<Vec<f64>>> {
    let n = points.len();
    let k = params.neighbors.clamp(1, n - 1);
    let (a, b) = fit_curve(params.min_dist);
    log::debug!("Graph layout curve for min_dist {}: a={:.4} b={:.4}", params.min_dist, a, b);

    let edges = fuzzy_graph(points, k);
    let n_epochs: usize = if n <= 10_000 { 500 } else { 200 };

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut y: Vec<Vec<f64>> = (0..n)
        .map(|_| {
            (0..params.target_dimension)
                .map(|_| rng.random_range(-INIT_RANGE..INIT_RANGE))
                .collect()
        })
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let negative_rate = NEGATIVE_SAMPLE_RATE as f64;
    let mut next_sample: Vec<f64> = edges.iter().map(|e| e.epochs_per_sample).collect();
    let mut next_negative: Vec<f64> = edges
        .iter()
        .map(|e| e.epochs_per_sample / negative_rate)
        .collect();

    for epoch in 0..n_epochs {
        deadline.check("projection")?;
        #[allow(clippy::cast_precision_loss)]
        let (epoch_f, alpha) = (epoch as f64, 1.0 - epoch as f64 / n_epochs as f64);

        for (idx, edge) in edges.iter().enumerate() {
            if next_sample[idx] > epoch_f {
                continue;
            }

            let (head, tail) = (edge.head, edge.tail);
            let d2 = squared_distance(&y[head], &y[tail]);
            let coeff = if d2 > 0.0 {
                -2.0 * a * b * d2.powf(b - 1.0) / (a * d2.powf(b) + 1.0)
            } else {
                0.0
            };
            for d in 0..params.target_dimension {
                let grad = (coeff * (y[head][d] - y[tail][d])).clamp(-CLIP, CLIP) * alpha;
                y[head][d] += grad;
                y[tail][d] -= grad;
            }
            next_sample[idx] += edge.epochs_per_sample;

            let negative_per_sample = edge.epochs_per_sample / negative_rate;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let n_negative = ((epoch_f - next_negative[idx]) / negative_per_sample).max(0.0) as usize;
            for _ in 0..n_negative {
                let other = rng.random_range(0..n);
                if other == head {
                    continue;
                }
                let d2 = squared_distance(&y[head], &y[other]);
                let coeff = if d2 > 0.0 {
                    2.0 * b / ((0.001 + d2) * (a * d2.powf(b) + 1.0))
                } else {
                    0.0
                };
                for d in 0..params.target_dimension {
                    let grad = if coeff > 0.0 {
                        (coeff * (y[head][d] - y[other][d])).clamp(-CLIP, CLIP)
                    } else {
                        CLIP
                    };
                    y[head][d] += grad * alpha;
                }
            }
            #[allow(clippy::cast_precision_loss)]
            let drawn = n_negative as f64;
            next_negative[idx] += drawn * negative_per_sample;
        }
    }

    Ok(y)
}

/// Symmetric fuzzy union of the kNN memberships, as directed edges.
fn fuzzy_graph(points: &[Vec<f64>], k: usize) -> Vec<Edge> {
    #[allow(clippy::cast_precision_loss)]
    let target = (k as f64).log2();
    let mut weights: BTreeMap<(usize, usize), f64> = BTreeMap::new();

    for (i, point) in points.iter().enumerate() {
        let mut neighbors: Vec<(usize, f64)> = points
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(j, other)| (j, distance(point, other)))
            .collect();
        neighbors.sort_by(|x, y| x.1.total_cmp(&y.1).then(x.0.cmp(&y.0)));
        neighbors.truncate(k);

        let rho = neighbors
            .iter()
            .map(|(_, d)| *d)
            .find(|d| *d > 0.0)
            .unwrap_or(0.0);
        let sigma = calibrate_sigma(&neighbors, rho, target);

        for (j, d) in neighbors {
            let w = (-((d - rho).max(0.0)) / sigma).exp();
            weights.insert((i, j), w);
        }
    }

    // w_sym = a + b - a * b over both directions.
    let mut symmetric: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for (&(i, j), &w) in &weights {
        let reverse = weights.get(&(j, i)).copied().unwrap_or(0.0);
        symmetric.insert((i, j), w + reverse - w * reverse);
        symmetric.insert((j, i), w + reverse - w * reverse);
    }

    let max_weight = symmetric.values().copied().fold(0.0, f64::max);
    symmetric
        .into_iter()
        .filter(|(_, w)| *w > 0.0)
        .map(|((head, tail), w)| Edge {
            head,
            tail,
            epochs_per_sample: max_weight / w,
        })
        .collect()
}

/// Bandwidth such that the membership strengths sum to `log2(k)`.
fn calibrate_sigma(neighbors: &[(usize, f64)], rho: f64, target: f64) -> f64 {
    let mut lo = 0.0;
    let mut hi = f64::INFINITY;
    let mut sigma = 1.0;
    for _ in 0..SIGMA_STEPS {
        let total: f64 = neighbors
            .iter()
            .map(|(_, d)| (-((d - rho).max(0.0)) / sigma).exp())
            .sum();
        if (total - target).abs() < 1e-5 {
            break;
        }
        if total > target {
            hi = sigma;
            sigma = (lo + hi) / 2.0;
        } else {
            lo = sigma;
            sigma = if hi.is_finite() { (lo + hi) / 2.0 } else { sigma * 2.0 };
        }
    }
    sigma.max(1e-3)
}

/// Fit `1 / (1 + a·x^(2b))` to the target membership curve for `min_dist`.
///
/// Least squares over 300 samples on `[0, 3·spread]`, by a shrinking
/// pattern search.
pub(crate) fn fit_curve(min_dist: f64) -> (f64, f64) {
    let xs: Vec<f64> = (0..300_i32)
        .map(|i| f64::from(i) * 3.0 * SPREAD / 299.0)
        .collect();
    let targets: Vec<f64> = xs
        .iter()
        .map(|&x| {
            if x < min_dist {
                1.0
            } else {
                (-(x - min_dist) / SPREAD).exp()
            }
        })
        .collect();
    let loss = |a: f64, b: f64| -> f64 {
        xs.iter()
            .zip(&targets)
            .map(|(&x, &t)| {
                let f = 1.0 / (1.0 + a * x.powf(2.0 * b));
                (f - t).powi(2)
            })
            .sum()
    };

    let (mut a, mut b) = (1.5, 0.9);
    let mut best = loss(a, b);
    let mut step = 0.5;
    while step > 1e-6 {
        let mut improved = false;
        for (da, db) in [(step, 0.0), (-step, 0.0), (0.0, step), (0.0, -step)] {
            let (na, nb) = (a + da, b + db);
            if na <= 0.0 || nb <= 0.0 {
                continue;
            }
            let l = loss(na, nb);
            if l < best {
                (a, b, best) = (na, nb, l);
                improved = true;
            }
        }
        if !improved {
            step /= 2.0;
        }
    }
    (a, b)
}
