//! Versioned params blob codec.
//!
//! Layout: one format-version byte followed by the MessagePack encoding of
//! the mapping. MessagePack is self-describing, so the blob decodes without
//! any external schema and nested values keep their types.

use thiserror::Error;

use crate::experiment::Params;

/// Current params blob format version.
pub const PARAMS_FORMAT_VERSION: u8 = 1;

/// Params blob encode/decode failures.
#[derive(Error, Debug)]
pub enum ParamsCodecError {
    /// Blob has no version byte
    #[error("params blob is empty")]
    Empty,

    /// Blob was written by an unknown format version
    #[error("unsupported params format version {found} (expected {PARAMS_FORMAT_VERSION})")]
    UnsupportedVersion {
        /// Version byte found in the blob
        found: u8,
    },

    /// MessagePack encoding failed
    #[error("encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding failed
    #[error("decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Encode a params mapping into a storable blob.
///
/// # Errors
///
/// Returns [`ParamsCodecError::Encode`] if serialization fails.
pub fn encode_params(params: &Params) -> Result<Vec<u8>, ParamsCodecError> {
    let mut blob = vec![PARAMS_FORMAT_VERSION];
    rmp_serde::encode::write_named(&mut blob, params)?;
    Ok(blob)
}

/// Decode a blob written by [`encode_params`].
///
/// # Errors
///
/// Returns an error for empty blobs, unknown version tags, or a corrupt payload.
pub fn decode_params(blob: &[u8]) -> Result<Params, ParamsCodecError> {
    let (&version, payload) = blob.split_first().ok_or(ParamsCodecError::Empty)?;
    if version != PARAMS_FORMAT_VERSION {
        return Err(ParamsCodecError::UnsupportedVersion { found: version });
    }
    Ok(rmp_serde::from_slice(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: serde_json::Value) -> Params {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_roundtrip_nested() {
        let original = params(json!({
            "lr": 0.01,
            "epochs": 10,
            "warmup": -3,
            "model": "resnet50",
            "augment": true,
            "scheduler": null,
            "layers": [64, 128, {"dropout": 0.5}],
            "optimizer": {"name": "adam", "betas": [0.9, 0.999]}
        }));

        let blob = encode_params(&original).unwrap();
        assert_eq!(blob[0], PARAMS_FORMAT_VERSION);
        assert_eq!(decode_params(&blob).unwrap(), original);
    }

    #[test]
    fn test_empty_mapping_roundtrip() {
        let blob = encode_params(&Params::new()).unwrap();
        assert!(decode_params(&blob).unwrap().is_empty());
    }

    #[test]
    fn test_empty_blob_rejected() {
        assert!(matches!(decode_params(&[]), Err(ParamsCodecError::Empty)));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut blob = encode_params(&Params::new()).unwrap();
        blob[0] = 42;
        assert!(matches!(
            decode_params(&blob),
            Err(ParamsCodecError::UnsupportedVersion { found: 42 })
        ));
    }

    #[test]
    fn test_corrupt_payload_rejected() {
        let blob = [PARAMS_FORMAT_VERSION, 0xc1];
        assert!(matches!(
            decode_params(&blob),
            Err(ParamsCodecError::Decode(_))
        ));
    }
}
