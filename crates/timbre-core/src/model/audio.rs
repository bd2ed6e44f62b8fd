use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The container format of a source audio file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioFormat {
    Flac,
    Mp3,
    Ogg,
    Wav,
    Other,
}

impl AudioFormat {
    /// Detect format from a file extension.
    #[must_use]
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "flac" => Self::Flac,
            "mp3" => Self::Mp3,
            "ogg" | "oga" => Self::Ogg,
            "wav" => Self::Wav,
            _ => Self::Other,
        }
    }

    /// Detect format from a path's extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .map(|ext| Self::from_extension(&ext.to_string_lossy()))
            .unwrap_or(Self::Other)
    }

    /// Whether the decoding layer accepts this format.
    #[must_use]
    pub const fn is_supported(self) -> bool {
        !matches!(self, Self::Other)
    }
}

/// A decoded mono waveform on its way through the pipeline.
///
/// Samples exist only while a pipeline run holds them; they are never
/// persisted. Ingestion takes ownership so the buffer is released on every
/// exit path.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSample {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub duration_secs: f64,
    pub filename: String,
    pub genre: String,
    pub source_path: PathBuf,
}

impl AudioSample {
    /// Build a sample, deriving duration from length and rate.
    #[must_use]
    pub fn new(
        samples: Vec<f32>,
        sample_rate: u32,
        filename: impl Into<String>,
        genre: impl Into<String>,
        source_path: impl Into<PathBuf>,
    ) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let duration_secs = if sample_rate == 0 {
            0.0
        } else {
            samples.len() as f64 / f64::from(sample_rate)
        };
        Self {
            samples,
            sample_rate,
            duration_secs,
            filename: filename.into(),
            genre: genre.into(),
            source_path: source_path.into(),
        }
    }
}
