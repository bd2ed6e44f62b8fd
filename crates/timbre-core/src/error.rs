use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The waveform could not be turned into features (empty, bad rate, NaN samples).
    #[error("extraction error: {0}")]
    Extraction(String),

    /// A vector's length differs from the corpus dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("store conflict: id {id} already exists")]
    StoreConflict { id: String },

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("timed out during {step}")]
    Timeout { step: &'static str },

    #[error("cancelled during {step}")]
    Cancelled { step: &'static str },

    #[error("corpus is empty")]
    CorpusEmpty,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl Error {
    /// Convenience constructor for extraction failures.
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction(message.into())
    }

    /// Convenience constructor for invalid input or configuration.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidData(message.into())
    }

    /// Classify the error for a serving boundary.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Extraction(_) | Self::DimensionMismatch { .. } | Self::InvalidData(_) => {
                ErrorKind::InvalidInput
            }
            Self::StoreConflict { .. } => ErrorKind::Conflict,
            Self::UnsupportedOperation(_) | Self::CorpusEmpty => ErrorKind::Unsupported,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Database(_) | Self::Io(_) | Self::Serialization(_) => ErrorKind::Internal,
        }
    }
}

/// Stable, coarse error classes that a serving layer can map to responses
/// without exposing internal detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    Unsupported,
    Timeout,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// HTTP-style status code for this class.
    pub const fn status_code(self) -> u16 {
        match self {
            Self::InvalidInput => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::Unsupported => 422,
            Self::Cancelled => 499,
            Self::Internal => 500,
            Self::Timeout => 504,
        }
    }

    /// A message safe to show to an end user.
    pub const fn public_message(self) -> &'static str {
        match self {
            Self::InvalidInput => "the submitted audio or parameters were rejected",
            Self::NotFound => "the requested sample does not exist",
            Self::Conflict => "a sample with this id already exists",
            Self::Unsupported => "the operation is not available for the current corpus or model",
            Self::Cancelled => "the request was cancelled",
            Self::Internal => "internal error",
            Self::Timeout => "the operation took too long and was abandoned",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_4xx() {
        let err = Error::DimensionMismatch {
            expected: 45,
            actual: 44,
        };
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(err.kind().status_code(), 400);
        assert_eq!(Error::extraction("empty").kind().status_code(), 400);
    }

    #[test]
    fn test_internal_errors_hide_detail() {
        let err = Error::Io(std::io::Error::other("disk on fire at /var/secret"));
        let kind = err.kind();
        assert_eq!(kind.status_code(), 500);
        assert!(!kind.public_message().contains("/var/secret"));
    }

    #[test]
    fn test_kinds_are_distinguishable() {
        let codes = [
            Error::StoreConflict { id: "x".into() }.kind().status_code(),
            Error::UnsupportedOperation("predict".into()).kind().status_code(),
            Error::Timeout { step: "extract" }.kind().status_code(),
            Error::CorpusEmpty.kind().status_code(),
        ];
        assert_eq!(codes, [409, 422, 504, 422]);
    }

    #[test]
    fn test_display_messages() {
        let err = Error::DimensionMismatch {
            expected: 45,
            actual: 3,
        };
        assert_eq!(err.to_string(), "dimension mismatch: expected 45, got 3");
        assert_eq!(
            Error::Timeout { step: "projection" }.to_string(),
            "timed out during projection"
        );
    }
}
