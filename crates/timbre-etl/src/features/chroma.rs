//! Pitch-class energy profile.

/// Pitch classes per octave, starting at C.
pub(crate) const N_CHROMA: usize = 12;

/// Bins below this frequency carry no usable pitch information.
const MIN_FREQUENCY: f64 = 20.0;
/// Offset from A (the 440 Hz reference) to C.
const A_INDEX: i64 = 9;

/// Pitch class of a frequency, with C = 0 and A = 9.
pub(crate) fn pitch_class(frequency: f64) -> usize {
    #[allow(clippy::cast_possible_truncation)]
    let semitones = (12.0 * (frequency / 440.0).log2()).round() as i64;
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    let class = (semitones + A_INDEX).rem_euclid(12) as usize;
    class
}

/// Mean over frames of the max-normalised 12-bin chroma.
///
/// Silent frames contribute zeros.
pub(crate) fn chroma_mean(power: &[Vec<f64>], frequencies: &[f64]) -> [f64; N_CHROMA] {
    let classes: Vec<Option<usize>> = frequencies
        .iter()
        .map(|&f| (f >= MIN_FREQUENCY).then(|| pitch_class(f)))
        .collect();

    let mut mean = [0.0; N_CHROMA];
    if power.is_empty() {
        return mean;
    }

    for frame in power {
        let mut profile = [0.0; N_CHROMA];
        for (p, class) in frame.iter().zip(&classes) {
            if let Some(c) = class {
                profile[*c] += p;
            }
        }
        let peak = profile.iter().copied().fold(0.0, f64::max);
        if peak > 0.0 {
            for (m, v) in mean.iter_mut().zip(profile) {
                *m += v / peak;
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let n = power.len() as f64;
    for m in &mut mean {
        *m /= n;
    }
    mean
}
