//! MsgPack codec using `rmp-serde`.
//!
//! Used for typed application bodies (build recipes, step results) carried
//! as `application/msgpack` messages on data channels.
//!
//! Structs are written with `to_vec_named` so that field names travel with
//! the data and either side can add optional fields without breaking the
//! other.
//!
//! # Example
//!
//! ```
//! use beepwire::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct StepResult {
//!     step: String,
//!     status: u8,
//! }
//!
//! let result = StepResult { step: "test".to_string(), status: 0 };
//! let encoded = MsgPackCodec::encode(&result).unwrap();
//! let decoded: StepResult = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, result);
//! ```

use crate::error::Result;

/// MessagePack codec for structured application data.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map format).
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Recipe {
        build: u32,
        steps: Vec<String>,
        keep_files: bool,
    }

    #[test]
    fn test_encode_decode_struct() {
        let original = Recipe {
            build: 42,
            steps: vec!["checkout".to_string(), "make".to_string()],
            keep_files: false,
        };

        let encoded = MsgPackCodec::encode(&original).unwrap();
        let decoded: Recipe = MsgPackCodec::decode(&encoded).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_structs_encode_as_maps() {
        let recipe = Recipe {
            build: 1,
            steps: Vec::new(),
            keep_files: true,
        };

        let encoded = MsgPackCodec::encode(&recipe).unwrap();

        // 0x83 = fixmap with 3 entries; positional encoding would be 0x93
        assert_eq!(encoded[0], 0x83);
    }

    #[test]
    fn test_optional_field_tolerated() {
        #[derive(Serialize)]
        struct Newer {
            build: u32,
            steps: Vec<String>,
            keep_files: bool,
            priority: u8,
        }

        #[derive(Deserialize, Debug)]
        struct Older {
            build: u32,
        }

        let encoded = MsgPackCodec::encode(&Newer {
            build: 7,
            steps: Vec::new(),
            keep_files: false,
            priority: 3,
        })
        .unwrap();

        let decoded: Older = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded.build, 7);
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let result: Result<Recipe> = MsgPackCodec::decode(b"not valid msgpack");
        assert!(result.is_err());
    }
}
