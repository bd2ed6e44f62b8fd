//! Row-matrix helpers shared by the analysis kernels.

use timbre_core::{Error, Result};

/// Widen embedding rows to f64, checking that every row has the same length.
///
/// Fails with `CorpusEmpty` for no rows, `InvalidData` for zero-length rows
/// and `DimensionMismatch` for ragged input.
pub(crate) fn to_f64_rows(embeddings: &[Vec<f32>]) -> Result<(Vec<Vec<f64>>, usize)> {
    let dim = embeddings.first().ok_or(Error::CorpusEmpty)?.len();
    if dim == 0 {
        return Err(Error::invalid("embeddings have zero length"));
    }
    let mut rows = Vec::with_capacity(embeddings.len());
    for row in embeddings {
        check_dimension(dim, row.len())?;
        rows.push(row.iter().map(|&v| f64::from(v)).collect());
    }
    Ok((rows, dim))
}

pub(crate) fn check_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::DimensionMismatch { expected, actual })
    }
}

pub(crate) fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

pub(crate) fn distance(a: &[f64], b: &[f64]) -> f64 {
    squared_distance(a, b).sqrt()
}

/// Full symmetric matrix of Euclidean distances.
pub(crate) fn pairwise_distances(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = rows.len();
    let mut out = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = distance(&rows[i], &rows[j]);
            out[i][j] = d;
            out[j][i] = d;
        }
    }
    out
}

/// Per-column mean of the given rows.
pub(crate) fn mean_row<'a>(rows: impl IntoIterator<Item = &'a Vec<f64>>, dim: usize) -> Vec<f64> {
    let mut sum = vec![0.0; dim];
    let mut count = 0_usize;
    for row in rows {
        for (s, v) in sum.iter_mut().zip(row) {
            *s += v;
        }
        count += 1;
    }
    if count > 0 {
        #[allow(clippy::cast_precision_loss)]
        let n = count as f64;
        for s in &mut sum {
            *s /= n;
        }
    }
    sum
}

/// Linear-interpolated percentile (`q` in `[0, 1]`) of unsorted values.
pub(crate) fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    {
        let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        let frac = pos - lo as f64;
        sorted[lo] + (sorted[hi] - sorted[lo]) * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_f64_rows_rejects_ragged_input() {
        let rows = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(matches!(
            to_f64_rows(&rows),
            Err(Error::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));
        assert!(matches!(to_f64_rows(&[]), Err(Error::CorpusEmpty)));
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert!((percentile(&values, 0.0) - 1.0).abs() < 1e-12);
        assert!((percentile(&values, 1.0) - 4.0).abs() < 1e-12);
        assert!((percentile(&values, 0.5) - 2.5).abs() < 1e-12);
        assert!((percentile(&values, 0.1) - 1.3).abs() < 1e-12);
    }

    #[test]
    fn test_pairwise_distances_symmetric() {
        let rows = vec![vec![0.0, 0.0], vec![3.0, 4.0], vec![0.0, 1.0]];
        let d = pairwise_distances(&rows);
        assert!((d[0][1] - 5.0).abs() < 1e-12);
        assert!((d[1][0] - d[0][1]).abs() < 1e-12);
        assert!(d[2][2].abs() < 1e-12);
    }
}
