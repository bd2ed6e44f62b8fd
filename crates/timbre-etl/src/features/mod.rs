//! Fixed-length acoustic descriptors for one waveform.
//!
//! Layout of the vector, for `n_mfcc` cepstral coefficients:
//!
//! | range | content |
//! |---|---|
//! | `0..n_mfcc` | MFCC means |
//! | `n_mfcc..2·n_mfcc` | MFCC standard deviations |
//! | next 12 | chroma means, C to B |
//! | last 7 | centroid mean, centroid std, roll-off mean, zero-crossing mean, tempo, RMS mean, bandwidth mean |

mod chroma;
mod mel;
mod spectral;
mod stft;
mod tempo;

use serde::{Deserialize, Serialize};

use timbre_core::model::{AudioSample, FeatureVector};
use timbre_core::{Deadline, Error, Result};

use chroma::N_CHROMA;

/// Scalar descriptors appended after the chroma block.
const N_SCALARS: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    pub n_fft: usize,
    pub hop: usize,
    pub n_mels: usize,
    pub n_mfcc: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop: 512,
            n_mels: 128,
            n_mfcc: 13,
        }
    }
}

/// Turns a waveform into a [`FeatureVector`] of [`FeatureExtractor::dimension`] values.
///
/// Extraction is a pure function of the input. Degenerate audio (silence,
/// clips shorter than one hop) still yields a full-length vector; estimators
/// that cannot produce a value fall back to zero.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: ExtractorConfig,
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        if config.n_fft < 2 || config.hop == 0 {
            return Err(Error::invalid(format!(
                "n_fft must be at least 2 and hop positive (got {} and {})",
                config.n_fft, config.hop
            )));
        }
        if config.n_mfcc == 0 || config.n_mfcc > config.n_mels {
            return Err(Error::invalid(format!(
                "n_mfcc must lie in 1..={} (got {})",
                config.n_mels, config.n_mfcc
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Length of every vector this extractor produces.
    pub fn dimension(&self) -> usize {
        2 * self.config.n_mfcc + N_CHROMA + N_SCALARS
    }

    pub fn extract(&self, sample: &AudioSample, deadline: &Deadline) -> Result<FeatureVector> {
        self.extract_waveform(&sample.samples, sample.sample_rate, deadline)
            .map_err(|e| match e {
                Error::Extraction(msg) => {
                    Error::Extraction(format!("{}: {}", sample.filename, msg))
                }
                other => other,
            })
    }

    /// One result per input, in input order. Failures are reported, never dropped.
    pub fn extract_batch(
        &self,
        samples: &[AudioSample],
        deadline: &Deadline,
    ) -> Vec<Result<FeatureVector>> {
        samples.iter().map(|s| self.extract(s, deadline)).collect()
    }

    pub fn extract_waveform(
        &self,
        samples: &[f32],
        sample_rate: u32,
        deadline: &Deadline,
    ) -> Result<FeatureVector> {
        if samples.is_empty() {
            return Err(Error::extraction("empty waveform"));
        }
        if sample_rate == 0 {
            return Err(Error::extraction("sample rate must be positive"));
        }
        if let Some(pos) = samples.iter().position(|s| !s.is_finite()) {
            return Err(Error::extraction(format!("non-finite sample at index {pos}")));
        }
        deadline.check("extraction")?;

        let ExtractorConfig {
            n_fft,
            hop,
            n_mels,
            n_mfcc,
        } = self.config;

        let spec = stft::stft(samples, sample_rate, n_fft, hop, deadline)?;
        let frequencies = spec.bin_frequencies();
        let power = spec.power();
        let magnitudes: Vec<Vec<f64>> = spec
            .magnitudes
            .iter()
            .map(|frame| frame.iter().map(|&m| f64::from(m)).collect())
            .collect();

        let bank = mel::filterbank(sample_rate, n_fft, n_mels);
        let log_mel = mel::power_to_db(&mel::mel_spectrogram(&power, &bank));
        let cepstra = mel::mfcc(&log_mel, n_mfcc);
        deadline.check("extraction")?;

        let mut values: Vec<f64> = Vec::with_capacity(self.dimension());
        let coefficient_stats: Vec<(f64, f64)> = (0..n_mfcc)
            .map(|c| {
                let track: Vec<f64> = cepstra.iter().map(|frame| frame[c]).collect();
                spectral::mean_std(&track)
            })
            .collect();
        values.extend(coefficient_stats.iter().map(|(mean, _)| *mean));
        values.extend(coefficient_stats.iter().map(|(_, std)| *std));

        values.extend(chroma::chroma_mean(&power, &frequencies));

        let centroids = spectral::centroids(&magnitudes, &frequencies);
        let (centroid_mean, centroid_std) = spectral::mean_std(&centroids);
        let (rolloff_mean, _) = spectral::mean_std(&spectral::rolloffs(&magnitudes, &frequencies));
        let (zcr_mean, _) = spectral::mean_std(&spectral::zero_crossing_rates(samples, n_fft, hop));
        let tempo = tempo::estimate(&tempo::onset_envelope(&log_mel), sample_rate, hop)
            .unwrap_or_else(|| {
                log::debug!(
                    "No tempo found in {} frames; using 0",
                    spec.n_frames()
                );
                0.0
            });
        let (rms_mean, _) = spectral::mean_std(&spectral::rms(samples, n_fft, hop));
        let (bandwidth_mean, _) =
            spectral::mean_std(&spectral::bandwidths(&magnitudes, &frequencies, &centroids));

        values.extend([
            centroid_mean,
            centroid_std,
            rolloff_mean,
            zcr_mean,
            tempo,
            rms_mean,
            bandwidth_mean,
        ]);

        Ok(FeatureVector::new(values.into_iter().map(finite_or_zero).collect()))
    }
}

/// Narrow to f32, replacing anything non-finite with zero.
fn finite_or_zero(value: f64) -> f32 {
    #[allow(clippy::cast_possible_truncation)]
    let narrowed = value as f32;
    if narrowed.is_finite() {
        narrowed
    } else {
        log::debug!("Replacing non-finite feature value {value} with 0");
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use timbre_core::model::FEATURE_DIM;

    const RATE: u32 = 22050;

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn sine(freq: f32, seconds: f32) -> Vec<f32> {
        let len = (seconds * RATE as f32) as usize;
        (0..len)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / RATE as f32).sin())
            .collect()
    }

    /// A short click every `period` samples.
    fn clicks(period: usize, seconds: usize) -> Vec<f32> {
        let len = seconds * RATE as usize;
        (0..len)
            .map(|i| if i % period < 32 { 0.9 } else { 0.0 })
            .collect()
    }

    #[test]
    fn test_default_dimension() {
        assert_eq!(FeatureExtractor::default().dimension(), FEATURE_DIM);
    }

    #[test]
    fn test_rejects_bad_input() {
        let extractor = FeatureExtractor::default();
        let none = Deadline::none();
        assert!(matches!(
            extractor.extract_waveform(&[], RATE, &none),
            Err(Error::Extraction(_))
        ));
        assert!(matches!(
            extractor.extract_waveform(&[0.1; 100], 0, &none),
            Err(Error::Extraction(_))
        ));
        assert!(matches!(
            extractor.extract_waveform(&[0.1, f32::NAN], RATE, &none),
            Err(Error::Extraction(_))
        ));
    }

    #[test]
    fn test_rejects_bad_config() {
        let config = ExtractorConfig {
            n_mfcc: 200,
            ..ExtractorConfig::default()
        };
        assert!(FeatureExtractor::new(config).is_err());
        let config = ExtractorConfig {
            hop: 0,
            ..ExtractorConfig::default()
        };
        assert!(FeatureExtractor::new(config).is_err());
    }

    #[test]
    fn test_silence_degrades_gracefully() {
        let features = FeatureExtractor::default()
            .extract_waveform(&vec![0.0; RATE as usize], RATE, &Deadline::none())
            .unwrap();
        assert_eq!(features.len(), FEATURE_DIM);
        assert!(features.as_slice().iter().all(|v| v.is_finite()));
        // Tempo falls back to zero.
        assert!(features.as_slice()[FEATURE_DIM - 3].abs() < f32::EPSILON);
    }

    #[test]
    fn test_tiny_clip_has_full_length() {
        let features = FeatureExtractor::default()
            .extract_waveform(&[0.25], RATE, &Deadline::none())
            .unwrap();
        assert_eq!(features.len(), FEATURE_DIM);
    }

    #[test]
    fn test_brighter_tone_has_higher_centroid() {
        let extractor = FeatureExtractor::default();
        let low = extractor
            .extract_waveform(&sine(220.0, 1.0), RATE, &Deadline::none())
            .unwrap();
        let high = extractor
            .extract_waveform(&sine(3520.0, 1.0), RATE, &Deadline::none())
            .unwrap();
        let centroid = 2 * 13 + N_CHROMA;
        assert!(high.as_slice()[centroid] > low.as_slice()[centroid]);
    }

    #[test]
    fn test_a440_lands_in_chroma_a() {
        let features = FeatureExtractor::default()
            .extract_waveform(&sine(440.0, 1.0), RATE, &Deadline::none())
            .unwrap();
        let chroma = &features.as_slice()[26..26 + N_CHROMA];
        let top = chroma
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(top, 9);
    }

    #[test]
    fn test_click_track_tempo() {
        // 22 hops per beat: about 117 BPM.
        let features = FeatureExtractor::default()
            .extract_waveform(&clicks(22 * 512, 8), RATE, &Deadline::none())
            .unwrap();
        let tempo = features.as_slice()[FEATURE_DIM - 3];
        assert!((tempo - 117.45).abs() < 3.0, "tempo {tempo}");
    }

    #[test]
    fn test_batch_reports_every_item() {
        let good = AudioSample::new(sine(440.0, 0.5), RATE, "a.wav", "test", "/a.wav");
        let bad = AudioSample::new(Vec::new(), RATE, "b.wav", "test", "/b.wav");
        let results = FeatureExtractor::default().extract_batch(
            &[good.clone(), bad, good],
            &Deadline::none(),
        );
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        let err = results[1].as_ref().unwrap_err();
        assert!(err.to_string().contains("b.wav"));
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_extraction_honours_deadline() {
        let err = FeatureExtractor::default()
            .extract_waveform(&sine(440.0, 1.0), RATE, &Deadline::after(std::time::Duration::ZERO))
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn test_fixed_length_for_any_waveform(
            samples in proptest::collection::vec(-1.0_f32..1.0, 1..6000),
            rate in prop_oneof![Just(8000_u32), Just(22050), Just(44100)],
        ) {
            let features = FeatureExtractor::default()
                .extract_waveform(&samples, rate, &Deadline::none())
                .unwrap();
            prop_assert_eq!(features.len(), FEATURE_DIM);
            prop_assert!(features.as_slice().iter().all(|v| v.is_finite()));
        }
    }
}
