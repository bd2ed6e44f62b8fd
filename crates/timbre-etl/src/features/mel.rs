//! Mel filterbank, decibel scaling and cepstral coefficients.

use std::f64::consts::PI;

/// Dynamic range kept below the loudest cell.
const TOP_DB: f64 = 80.0;
const AMIN: f64 = 1e-10;

pub(crate) fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

pub(crate) fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10f64.powf(mel / 2595.0) - 1.0)
}

/// `n_mels` triangular filters over `[0, sr/2]`, each normalised to unit area.
pub(crate) fn filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<Vec<f64>> {
    let nyquist = f64::from(sample_rate) / 2.0;
    let top = hz_to_mel(nyquist);
    #[allow(clippy::cast_precision_loss)]
    let edges: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(top * i as f64 / (n_mels + 1) as f64))
        .collect();
    #[allow(clippy::cast_precision_loss)]
    let bins: Vec<f64> = (0..=n_fft / 2)
        .map(|k| k as f64 * f64::from(sample_rate) / n_fft as f64)
        .collect();

    (0..n_mels)
        .map(|m| {
            let (lo, center, hi) = (edges[m], edges[m + 1], edges[m + 2]);
            let norm = 2.0 / (hi - lo);
            bins.iter()
                .map(|&f| {
                    let rising = (f - lo) / (center - lo);
                    let falling = (hi - f) / (hi - center);
                    rising.min(falling).max(0.0) * norm
                })
                .collect()
        })
        .collect()
}

/// Apply the filterbank to every power frame.
pub(crate) fn mel_spectrogram(power: &[Vec<f64>], bank: &[Vec<f64>]) -> Vec<Vec<f64>> {
    power
        .iter()
        .map(|frame| {
            bank.iter()
                .map(|filter| filter.iter().zip(frame).map(|(w, p)| w * p).sum())
                .collect()
        })
        .collect()
}

/// `10·log10(S)` floored at `max - 80 dB` over the whole matrix.
pub(crate) fn power_to_db(spec: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let mut db: Vec<Vec<f64>> = spec
        .iter()
        .map(|frame| frame.iter().map(|&s| 10.0 * s.max(AMIN).log10()).collect())
        .collect();
    let peak = db
        .iter()
        .flatten()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let floor = peak - TOP_DB;
    for v in db.iter_mut().flatten() {
        *v = v.max(floor);
    }
    db
}

/// First `n_out` coefficients of the orthonormal DCT-II.
pub(crate) fn dct_ortho(input: &[f64], n_out: usize) -> Vec<f64> {
    #[allow(clippy::cast_precision_loss)]
    let n = input.len() as f64;
    (0..n_out)
        .map(|k| {
            #[allow(clippy::cast_precision_loss)]
            let sum: f64 = input
                .iter()
                .enumerate()
                .map(|(i, x)| x * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos())
                .sum();
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            sum * scale
        })
        .collect()
}

/// Per-frame cepstral coefficients from a log-mel spectrogram.
pub(crate) fn mfcc(log_mel: &[Vec<f64>], n_mfcc: usize) -> Vec<Vec<f64>> {
    log_mel.iter().map(|frame| dct_ortho(frame, n_mfcc)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mel_scale_round_trip() {
        for hz in [0.0, 440.0, 1000.0, 11025.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 1e-6);
        }
        assert!((hz_to_mel(1000.0) - 999.99).abs() < 0.1);
    }

    #[test]
    fn test_filterbank_shape_and_area() {
        let bank = filterbank(22050, 2048, 128);
        assert_eq!(bank.len(), 128);
        assert!(bank.iter().all(|f| f.len() == 1025));
        assert!(bank.iter().flatten().all(|&w| w >= 0.0));
        // High filters are wide enough to cover several bins.
        assert!(bank[120].iter().filter(|&&w| w > 0.0).count() > 3);
    }

    #[test]
    fn test_db_floor() {
        let db = power_to_db(&[vec![1.0, 1e-12, 1e-3]]);
        assert!((db[0][0]).abs() < 1e-9);
        assert!((db[0][1] + 80.0).abs() < 1e-9);
        assert!((db[0][2] + 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_dct_of_constant_is_dc_only() {
        let out = dct_ortho(&[2.0; 16], 4);
        assert!((out[0] - 2.0 * 4.0).abs() < 1e-9);
        assert!(out[1..].iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn test_dct_preserves_energy() {
        let input: Vec<f64> = (0..8_i32).map(|i| f64::from(i * i) - 10.0).collect();
        let out = dct_ortho(&input, 8);
        let e_in: f64 = input.iter().map(|x| x * x).sum();
        let e_out: f64 = out.iter().map(|x| x * x).sum();
        assert!((e_in - e_out).abs() < 1e-6);
    }
}
