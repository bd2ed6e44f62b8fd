//! Global tempo estimate from onset-strength autocorrelation.

const MIN_BPM: f64 = 30.0;
const MAX_BPM: f64 = 300.0;
const PRIOR_BPM: f64 = 120.0;
/// Width of the log-normal tempo prior, in octaves.
const PRIOR_OCTAVES: f64 = 1.0;

/// Mean positive log-mel flux per frame; frame 0 is zero.
pub(crate) fn onset_envelope(log_mel: &[Vec<f64>]) -> Vec<f64> {
    let mut envelope = Vec::with_capacity(log_mel.len());
    envelope.push(0.0);
    for pair in log_mel.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        let flux: f64 = cur.iter().zip(prev).map(|(c, p)| (c - p).max(0.0)).sum();
        #[allow(clippy::cast_precision_loss)]
        let n = cur.len().max(1) as f64;
        envelope.push(flux / n);
    }
    envelope.truncate(log_mel.len());
    envelope
}

/// Tempo in BPM, or `None` when the envelope carries no periodicity.
pub(crate) fn estimate(envelope: &[f64], sample_rate: u32, hop: usize) -> Option<f64> {
    #[allow(clippy::cast_precision_loss)]
    let frames_per_minute = 60.0 * f64::from(sample_rate) / hop as f64;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let min_lag = (frames_per_minute / MAX_BPM).ceil().max(1.0) as usize;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let max_lag = (frames_per_minute / MIN_BPM).floor() as usize;
    let max_lag = max_lag.min(envelope.len().saturating_sub(1));
    if min_lag > max_lag {
        return None;
    }

    let energy: f64 = envelope.iter().map(|v| v * v).sum();
    if energy <= f64::EPSILON {
        return None;
    }

    let mut best: Option<(usize, f64)> = None;
    for lag in min_lag..=max_lag {
        let overlap = envelope.len() - lag;
        #[allow(clippy::cast_precision_loss)]
        let correlation = envelope[..overlap]
            .iter()
            .zip(&envelope[lag..])
            .map(|(a, b)| a * b)
            .sum::<f64>()
            / overlap as f64;

        #[allow(clippy::cast_precision_loss)]
        let bpm = frames_per_minute / lag as f64;
        let octaves = (bpm / PRIOR_BPM).log2() / PRIOR_OCTAVES;
        let score = correlation * (-0.5 * octaves * octaves).exp();

        if score > 0.0 && best.is_none_or(|(_, s)| score > s) {
            best = Some((lag, score));
        }
    }

    best.map(|(lag, _)| {
        #[allow(clippy::cast_precision_loss)]
        let lag = lag as f64;
        frames_per_minute / lag
    })
}
