//! Scalar spectral and temporal descriptors.

use super::stft::{centered_frame, frame_count};

const ROLLOFF_PERCENT: f64 = 0.85;

/// Population mean and standard deviation; `(0, 0)` for no values.
pub(crate) fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Magnitude-weighted mean frequency per frame (0 for silent frames).
pub(crate) fn centroids(magnitudes: &[Vec<f64>], frequencies: &[f64]) -> Vec<f64> {
    magnitudes
        .iter()
        .map(|frame| {
            let total: f64 = frame.iter().sum();
            if total > 0.0 {
                frame.iter().zip(frequencies).map(|(m, f)| m * f).sum::<f64>() / total
            } else {
                0.0
            }
        })
        .collect()
}

/// Frequency below which 85% of each frame's magnitude lies.
pub(crate) fn rolloffs(magnitudes: &[Vec<f64>], frequencies: &[f64]) -> Vec<f64> {
    magnitudes
        .iter()
        .map(|frame| {
            let threshold = ROLLOFF_PERCENT * frame.iter().sum::<f64>();
            if threshold <= 0.0 {
                return 0.0;
            }
            let mut cumulative = 0.0;
            for (m, f) in frame.iter().zip(frequencies) {
                cumulative += m;
                if cumulative >= threshold {
                    return *f;
                }
            }
            frequencies.last().copied().unwrap_or(0.0)
        })
        .collect()
}

/// Second-order spectral bandwidth around each frame's centroid.
pub(crate) fn bandwidths(
    magnitudes: &[Vec<f64>],
    frequencies: &[f64],
    centroids: &[f64],
) -> Vec<f64> {
    magnitudes
        .iter()
        .zip(centroids)
        .map(|(frame, centroid)| {
            let total: f64 = frame.iter().sum();
            if total > 0.0 {
                let spread: f64 = frame
                    .iter()
                    .zip(frequencies)
                    .map(|(m, f)| m * (f - centroid).powi(2))
                    .sum();
                (spread / total).sqrt()
            } else {
                0.0
            }
        })
        .collect()
}

/// Fraction of sign changes in each centered frame.
pub(crate) fn zero_crossing_rates(samples: &[f32], frame_len: usize, hop: usize) -> Vec<f64> {
    (0..frame_count(samples.len(), hop))
        .map(|index| {
            let frame = centered_frame(samples, frame_len, hop, index);
            let crossings = frame
                .windows(2)
                .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
                .count();
            #[allow(clippy::cast_precision_loss)]
            let rate = crossings as f64 / frame_len as f64;
            rate
        })
        .collect()
}

/// Root-mean-square energy of each centered frame.
pub(crate) fn rms(samples: &[f32], frame_len: usize, hop: usize) -> Vec<f64> {
    (0..frame_count(samples.len(), hop))
        .map(|index| {
            let frame = centered_frame(samples, frame_len, hop, index);
            let energy: f64 = frame.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
            #[allow(clippy::cast_precision_loss)]
            let mean = energy / frame_len as f64;
            mean.sqrt()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_std() {
        let (mean, std) = mean_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((mean - 5.0).abs() < 1e-12);
        assert!((std - 2.0).abs() < 1e-12);
        assert_eq!(mean_std(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_centroid_rolloff_bandwidth_of_two_bins() {
        let frequencies = vec![0.0, 100.0, 200.0, 300.0];
        let frame = vec![vec![0.0, 1.0, 0.0, 1.0]];
        let c = centroids(&frame, &frequencies);
        assert!((c[0] - 200.0).abs() < 1e-9);
        assert!((rolloffs(&frame, &frequencies)[0] - 300.0).abs() < 1e-9);
        assert!((bandwidths(&frame, &frequencies, &c)[0] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_silent_frames_are_zero() {
        let frequencies = vec![0.0, 100.0];
        let frame = vec![vec![0.0, 0.0]];
        assert!(centroids(&frame, &frequencies)[0].abs() < f64::EPSILON);
        assert!(rolloffs(&frame, &frequencies)[0].abs() < f64::EPSILON);
    }

    #[test]
    fn test_zcr_of_alternating_signal() {
        let samples: Vec<f32> = (0..4096).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let rates = zero_crossing_rates(&samples, 2048, 512);
        // Interior frames flip sign at every step.
        assert!((rates[4] - 2047.0 / 2048.0).abs() < 1e-9);
    }

    #[test]
    fn test_rms_of_constant() {
        let samples = vec![0.5_f32; 8192];
        let values = rms(&samples, 2048, 512);
        assert!((values[8] - 0.5).abs() < 1e-9);
        // Edge frames are half padding.
        assert!(values[0] < 0.5);
    }
}
