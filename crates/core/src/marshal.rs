//! Serialization seam.
//!
//! Components that persist or hash structures are generic over a
//! [`Marshalizer`] so the on-disk codec is a single swappable choice.
//! [`BincodeMarshalizer`] is the default (compact, deterministic);
//! [`JsonMarshalizer`] exists for human-readable storage such as persisted
//! metric maps.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Errors produced by marshaling.
#[derive(Debug, Error)]
pub enum MarshalError {
    /// Serialization failed.
    #[error("marshal failed: {0}")]
    Marshal(String),

    /// Deserialization failed.
    #[error("unmarshal failed: {0}")]
    Unmarshal(String),
}

/// Object (de)serialization used for hashing, network payloads and storage.
pub trait Marshalizer: Clone + Send + Sync + 'static {
    /// Serialize a value.
    fn marshal<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, MarshalError>;

    /// Deserialize a value.
    fn unmarshal<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, MarshalError>;
}

/// Bincode-backed marshalizer; the default codec for trie nodes, bootstrap
/// records and consensus payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeMarshalizer;

impl Marshalizer for BincodeMarshalizer {
    fn marshal<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, MarshalError> {
        bincode::serialize(value).map_err(|e| MarshalError::Marshal(e.to_string()))
    }

    fn unmarshal<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, MarshalError> {
        bincode::deserialize(data).map_err(|e| MarshalError::Unmarshal(e.to_string()))
    }
}

/// JSON-backed marshalizer for debugging and human-readable persistence.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMarshalizer;

impl Marshalizer for JsonMarshalizer {
    fn marshal<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, MarshalError> {
        serde_json::to_vec(value).map_err(|e| MarshalError::Marshal(e.to_string()))
    }

    fn unmarshal<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, MarshalError> {
        serde_json::from_slice(data).map_err(|e| MarshalError::Unmarshal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bincode_round_trip() {
        let m = BincodeMarshalizer;
        let value = vec![1u64, 2, 3];
        let bytes = m.marshal(&value).unwrap();
        let back: Vec<u64> = m.unmarshal(&bytes).unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn json_round_trip() {
        let m = JsonMarshalizer;
        let value = ("key".to_string(), 42u64);
        let bytes = m.marshal(&value).unwrap();
        let back: (String, u64) = m.unmarshal(&bytes).unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn unmarshal_rejects_garbage() {
        let m = BincodeMarshalizer;
        let result: Result<Vec<u64>, _> = m.unmarshal(&[0xff]);
        assert!(result.is_err());
    }
}
