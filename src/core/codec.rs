//! Payload serialization boundary
//!
//! Values cross into the cache as encoded bytes; the codec is the explicit
//! seam where that happens. The binary codec falls back to JSON when a value
//! cannot be represented in bincode (e.g. untagged enums); if both codecs
//! fail, the caller simply skips caching the value.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use super::error::{CacheError, Result};

/// Serialization format for cached payloads
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// Human-readable JSON (serde_json)
    #[default]
    Json,
    /// Compact binary encoding (bincode)
    Binary,
}

impl Codec {
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Codec::Json => {
                serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))
            }
            Codec::Binary => bincode::serde::encode_to_vec(value, bincode::config::standard())
                .map_err(|e| CacheError::Serialization(e.to_string())),
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            Codec::Json => {
                serde_json::from_slice(bytes).map_err(|e| CacheError::Serialization(e.to_string()))
            }
            Codec::Binary => bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map(|(value, _)| value)
                .map_err(|e| CacheError::Serialization(e.to_string())),
        }
    }

    /// Encode with the fallback policy: `Binary` retries as JSON on failure
    pub fn encode_with_fallback<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self.encode(value) {
            Ok(bytes) => Ok(bytes),
            Err(e) if *self == Codec::Binary => {
                debug!("binary encode failed ({}), falling back to JSON", e);
                Codec::Json.encode(value)
            }
            Err(e) => Err(e),
        }
    }

    /// Decode counterpart of [`encode_with_fallback`](Self::encode_with_fallback)
    pub fn decode_with_fallback<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self.decode(bytes) {
            Ok(value) => Ok(value),
            Err(e) if *self == Codec::Binary => {
                debug!("binary decode failed ({}), retrying as JSON", e);
                Codec::Json.decode(bytes)
            }
            Err(e) => Err(e),
        }
    }
}
