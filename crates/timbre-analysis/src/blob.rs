//! Versioned JSON envelope for fitted models.
//!
//! Callers treat the bytes as opaque; only the owning model type can decode
//! them, and a blob written for one model kind is rejected by another.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

use timbre_core::{Error, Result};

const BLOB_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    kind: &'a str,
    version: u32,
    model: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    kind: String,
    version: u32,
    model: T,
}

pub(crate) fn encode<T: Serialize>(kind: &str, model: &T) -> Result<Vec<u8>> {
    let envelope = EnvelopeRef {
        kind,
        version: BLOB_VERSION,
        model,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

pub(crate) fn decode<T: DeserializeOwned>(kind: &str, bytes: &[u8]) -> Result<T> {
    let envelope: Envelope<T> = serde_json::from_slice(bytes)?;
    if envelope.kind != kind {
        return Err(Error::invalid(format!(
            "expected a {kind} blob, found {}",
            envelope.kind
        )));
    }
    if envelope.version != BLOB_VERSION {
        return Err(Error::invalid(format!(
            "unsupported {kind} blob version {}",
            envelope.version
        )));
    }
    Ok(envelope.model)
}

pub(crate) fn save(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_kind_is_checked() {
        let bytes = encode("cluster_model", &vec![1.0_f64, 2.0]).unwrap();
        let back: Vec<f64> = decode("cluster_model", &bytes).unwrap();
        assert_eq!(back, vec![1.0, 2.0]);

        let err = decode::<Vec<f64>>("anomaly_model", &bytes).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn test_blob_rejects_garbage() {
        assert!(matches!(
            decode::<Vec<f64>>("cluster_model", b"not json"),
            Err(Error::Serialization(_))
        ));
    }
}
