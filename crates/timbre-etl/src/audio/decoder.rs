use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use timbre_core::model::AudioSample;

/// Decoded audio as mono PCM samples at a specific sample rate.
#[derive(Debug)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub duration_secs: f64,
}

/// Decode an audio file and wrap it as a pipeline sample labelled with `genre`.
pub fn load_sample(path: &Path, genre: &str, target_sample_rate: u32) -> Result<AudioSample> {
    let decoded = decode_audio(path, target_sample_rate)?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(AudioSample::new(
        decoded.samples,
        decoded.sample_rate,
        filename,
        genre,
        path,
    ))
}

/// Decode an audio file to mono PCM samples.
///
/// Resamples to `target_sample_rate` and converts multichannel audio to mono
/// by averaging channels.
pub fn decode_audio(path: &Path, target_sample_rate: u32) -> Result<DecodedAudio> {
    if target_sample_rate == 0 {
        anyhow::bail!("Target sample rate must be positive");
    }

    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("Failed to probe audio format: {}", path.display()))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .context("No default audio track found")?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .context("Failed to create decoder")?;

    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut channels = codec_params.channels.map_or(1, |c| c.count());
    let mut all_samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e).context("Failed to read packet"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(audio_buf) => {
                if sample_buf.is_none() {
                    let spec = *audio_buf.spec();
                    channels = spec.channels.count();
                    let duration = audio_buf.capacity() as u64;
                    sample_buf = Some(SampleBuffer::<f32>::new(duration, spec));
                }

                if let Some(ref mut buf) = sample_buf {
                    buf.copy_interleaved_ref(audio_buf);
                    all_samples.extend_from_slice(buf.samples());
                }
            }
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                log::debug!("Skipping undecodable packet in {}: {}", path.display(), e);
            }
            Err(e) => return Err(e).context("Failed to decode packet"),
        }
    }

    let mono_samples = downmix(all_samples, channels);

    let source_rate = codec_params.sample_rate.unwrap_or(target_sample_rate);
    let resampled = resample_linear(&mono_samples, source_rate, target_sample_rate);

    #[allow(clippy::cast_precision_loss)]
    let duration = resampled.len() as f64 / f64::from(target_sample_rate);

    log::debug!(
        "Decoded {} ({} Hz, {} ch) to {} mono samples at {} Hz",
        path.display(),
        source_rate,
        channels,
        resampled.len(),
        target_sample_rate
    );

    Ok(DecodedAudio {
        samples: resampled,
        sample_rate: target_sample_rate,
        duration_secs: duration,
    })
}

/// Average interleaved frames of `channels` samples into one mono stream.
///
/// A trailing partial frame is averaged over the samples it has.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn downmix(interleaved: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved;
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Linear-interpolation resampling.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub(crate) fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let output_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let pos = i as f64 * ratio;
        let idx = pos as usize;
        if idx + 1 < samples.len() {
            let frac = pos - idx as f64;
            let sample = samples[idx].mul_add(1.0 - frac as f32, samples[idx + 1] * frac as f32);
            output.push(sample);
        } else if idx < samples.len() {
            output.push(samples[idx]);
        }
    }

    output
}
