//! Short-time Fourier transform over centered, zero-padded frames.

use realfft::RealFftPlanner;

use timbre_core::{Deadline, Error, Result};

/// Frames processed between deadline checks.
const FRAME_BLOCK: usize = 64;

/// Magnitude spectrogram: one row of `n_fft / 2 + 1` bins per frame.
#[derive(Debug, Clone)]
pub(crate) struct Spectrogram {
    pub n_fft: usize,
    pub sample_rate: u32,
    pub magnitudes: Vec<Vec<f32>>,
}

impl Spectrogram {
    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    pub fn n_frames(&self) -> usize {
        self.magnitudes.len()
    }

    /// Center frequency of each bin in Hz.
    #[allow(clippy::cast_precision_loss)]
    pub fn bin_frequencies(&self) -> Vec<f64> {
        let step = f64::from(self.sample_rate) / self.n_fft as f64;
        (0..self.n_bins()).map(|k| k as f64 * step).collect()
    }

    /// `|X|²` per frame and bin.
    pub fn power(&self) -> Vec<Vec<f64>> {
        self.magnitudes
            .iter()
            .map(|frame| frame.iter().map(|&m| f64::from(m) * f64::from(m)).collect())
            .collect()
    }
}

/// Number of centered frames for a signal of `len` samples.
pub(crate) fn frame_count(len: usize, hop: usize) -> usize {
    1 + len / hop
}

/// Frame `index` of the signal, zero-padded by `frame_len / 2` on both sides.
pub(crate) fn centered_frame(samples: &[f32], frame_len: usize, hop: usize, index: usize) -> Vec<f32> {
    let pad = frame_len / 2;
    let start = index * hop;
    (0..frame_len)
        .map(|i| {
            (start + i)
                .checked_sub(pad)
                .and_then(|idx| samples.get(idx))
                .copied()
                .unwrap_or(0.0)
        })
        .collect()
}

/// Periodic Hann window of length `n`.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub(crate) fn hann(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let phase = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
            (0.5 - 0.5 * phase.cos()) as f32
        })
        .collect()
}

pub(crate) fn stft(
    samples: &[f32],
    sample_rate: u32,
    n_fft: usize,
    hop: usize,
    deadline: &Deadline,
) -> Result<Spectrogram> {
    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let window = hann(n_fft);

    let mut input = fft.make_input_vec();
    let mut spectrum = fft.make_output_vec();
    let n_frames = frame_count(samples.len(), hop);
    let mut magnitudes = Vec::with_capacity(n_frames);

    for index in 0..n_frames {
        if index % FRAME_BLOCK == 0 {
            deadline.check("extraction")?;
        }
        let frame = centered_frame(samples, n_fft, hop, index);
        for ((slot, sample), w) in input.iter_mut().zip(&frame).zip(&window) {
            *slot = sample * w;
        }
        fft.process(&mut input, &mut spectrum)
            .map_err(|e| Error::extraction(format!("FFT failed: {e}")))?;
        magnitudes.push(spectrum.iter().map(|c| c.norm()).collect());
    }

    Ok(Spectrogram {
        n_fft,
        sample_rate,
        magnitudes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(clippy::cast_precision_loss)]
    fn sine(freq: f32, rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_frame_count_is_centered() {
        assert_eq!(frame_count(0, 512), 1);
        assert_eq!(frame_count(22050, 512), 44);
    }

    #[test]
    fn test_centered_frame_pads_with_zeros() {
        let samples = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(centered_frame(&samples, 4, 2, 0), vec![0.0, 0.0, 1.0, 2.0]);
        assert_eq!(centered_frame(&samples, 4, 2, 2), vec![3.0, 4.0, 0.0, 0.0]);
    }

    #[test]
    fn test_hann_is_periodic() {
        let w = hann(8);
        assert!(w[0].abs() < 1e-7);
        assert!((w[4] - 1.0).abs() < 1e-6);
        assert!((w[1] - w[7]).abs() < 1e-6);
    }

    #[test]
    fn test_sine_peaks_at_its_bin() {
        // 1000 Hz at 22050 Hz with n_fft 2048 sits near bin 92.9.
        let spec = stft(&sine(1000.0, 22050, 22050), 22050, 2048, 512, &Deadline::none()).unwrap();
        let middle = &spec.magnitudes[spec.n_frames() / 2];
        let peak = middle
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| k)
            .unwrap();
        assert!((92..=94).contains(&peak), "peak at bin {peak}");
        assert_eq!(middle.len(), spec.n_bins());
    }

    #[test]
    fn test_expired_deadline_aborts() {
        let err = stft(
            &sine(440.0, 22050, 4096),
            22050,
            2048,
            512,
            &Deadline::after(std::time::Duration::ZERO),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Timeout { step: "extraction" }));
    }
}
