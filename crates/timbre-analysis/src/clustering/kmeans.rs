//! Seeded k-means with k-means++ initialisation.

use rand::rngs::StdRng;
use rand::Rng;

use crate::matrix::{mean_row, squared_distance};

#[derive(Debug, Clone)]
pub(crate) struct KMeansResult {
    pub centroids: Vec<Vec<f64>>,
    pub assignments: Vec<usize>,
    pub inertia: f64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct KMeansParams {
    pub k: usize,
    pub n_init: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
}

/// Index of the nearest centroid; ties go to the lower index.
pub(crate) fn nearest_centroid(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (idx, centroid) in centroids.iter().enumerate() {
        let d = squared_distance(point, centroid);
        if d < best.1 {
            best = (idx, d);
        }
    }
    best
}

/// Best of `n_init` Lloyd runs by inertia. `points` must be non-empty and
/// `1 <= k <= points.len()`; the caller validates both.
pub(crate) fn fit(points: &[Vec<f64>], params: KMeansParams, rng: &mut StdRng) -> KMeansResult {
    let dim = points[0].len();
    let abs_tolerance = params.tolerance * mean_variance(points, dim);

    let mut best = lloyd(points, params, abs_tolerance, rng);
    log::debug!("k-means run 0 (k={}): inertia {:.4}", params.k, best.inertia);
    for run in 1..params.n_init {
        let result = lloyd(points, params, abs_tolerance, rng);
        log::debug!(
            "k-means run {} (k={}): inertia {:.4}",
            run,
            params.k,
            result.inertia
        );
        if result.inertia < best.inertia {
            best = result;
        }
    }
    best
}

fn lloyd(
    points: &[Vec<f64>],
    params: KMeansParams,
    abs_tolerance: f64,
    rng: &mut StdRng,
) -> KMeansResult {
    let dim = points[0].len();
    let mut centroids = plus_plus_init(points, params.k, rng);
    let mut assignments = vec![0_usize; points.len()];

    for _ in 0..params.max_iterations {
        for (slot, point) in assignments.iter_mut().zip(points) {
            *slot = nearest_centroid(point, &centroids).0;
        }

        let mut next = Vec::with_capacity(params.k);
        for cluster in 0..params.k {
            let members = points
                .iter()
                .zip(&assignments)
                .filter(|(_, &a)| a == cluster)
                .map(|(p, _)| p);
            let mut members = members.peekable();
            if members.peek().is_some() {
                next.push(mean_row(members, dim));
            } else {
                next.push(farthest_point(points, &assignments, &centroids).clone());
            }
        }

        let shift: f64 = centroids
            .iter()
            .zip(&next)
            .map(|(old, new)| squared_distance(old, new))
            .sum();
        centroids = next;
        if shift <= abs_tolerance {
            break;
        }
    }

    // Final labels come from the same rule `predict` uses.
    let mut inertia = 0.0;
    for (slot, point) in assignments.iter_mut().zip(points) {
        let (idx, d) = nearest_centroid(point, &centroids);
        *slot = idx;
        inertia += d;
    }

    KMeansResult {
        centroids,
        assignments,
        inertia,
    }
}

/// k-means++: each next seed is drawn with probability proportional to its
/// squared distance from the closest seed so far.
fn plus_plus_init(points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let n = points.len();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.random_range(0..n)].clone());

    let mut closest: Vec<f64> = points
        .iter()
        .map(|p| squared_distance(p, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = closest.iter().sum();
        let chosen = if total > 0.0 {
            let target = rng.random::<f64>() * total;
            let mut acc = 0.0;
            let mut pick = n - 1;
            for (idx, d) in closest.iter().enumerate() {
                acc += d;
                if acc >= target && *d > 0.0 {
                    pick = idx;
                    break;
                }
            }
            pick
        } else {
            rng.random_range(0..n)
        };

        let seed = points[chosen].clone();
        for (slot, point) in closest.iter_mut().zip(points) {
            *slot = slot.min(squared_distance(point, &seed));
        }
        centroids.push(seed);
    }
    centroids
}

/// The point farthest from its assigned centroid, used to reseed an empty cluster.
fn farthest_point<'a>(
    points: &'a [Vec<f64>],
    assignments: &[usize],
    centroids: &[Vec<f64>],
) -> &'a Vec<f64> {
    let mut best = (0, -1.0);
    for (idx, (point, &a)) in points.iter().zip(assignments).enumerate() {
        let d = squared_distance(point, &centroids[a]);
        if d > best.1 {
            best = (idx, d);
        }
    }
    &points[best.0]
}

fn mean_variance(points: &[Vec<f64>], dim: usize) -> f64 {
    let mean = mean_row(points, dim);
    #[allow(clippy::cast_precision_loss)]
    let n = points.len() as f64;
    let total: f64 = points.iter().map(|p| squared_distance(p, &mean)).sum();
    #[allow(clippy::cast_precision_loss)]
    let dims = dim as f64;
    total / n / dims
}
