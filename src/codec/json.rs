//! JSON codec using `serde_json`.
//!
//! Management documents on channel 0 are JSON, written compactly on a single
//! line.

use crate::error::Result;

/// JSON codec for management documents.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to compact JSON bytes.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    /// Decode JSON bytes to a value.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_output() {
        let encoded = JsonCodec::encode(&serde_json::json!({ "a": [1, 2] })).unwrap();
        assert_eq!(encoded, br#"{"a":[1,2]}"#);
    }

    #[test]
    fn test_decode_error() {
        let result: Result<serde_json::Value> = JsonCodec::decode(b"{not json");
        assert!(result.unwrap_err().to_string().starts_with("JSON error"));
    }
}
