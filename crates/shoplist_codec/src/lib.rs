//! # Shoplist Codec
//!
//! CBOR encoding/decoding for shoplist.
//!
//! Every value that leaves a process goes through this crate: CRDT snapshots
//! written to storage, and the message envelope sent over the wire. CBOR keeps
//! frames compact while staying self-describing, so a decoder can reject a
//! malformed frame without knowing who produced it.
//!
//! ## Usage
//!
//! ```
//! use shoplist_codec::{from_cbor, to_cbor};
//!
//! let bytes = to_cbor(&vec![1u32, 2, 3]).unwrap();
//! let decoded: Vec<u32> = from_cbor(&bytes).unwrap();
//! assert_eq!(decoded, vec![1, 2, 3]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;

pub use error::{CodecError, CodecResult};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a value to CBOR bytes.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::ser::into_writer(value, &mut buffer)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buffer)
}

/// Decode a value from CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes are empty, are not valid CBOR, or do not
/// match the shape of `T`.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    if bytes.is_empty() {
        return Err(CodecError::UnexpectedEof);
    }
    ciborium::de::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

/// Decode a value from CBOR bytes, rejecting inputs larger than `limit`.
///
/// # Errors
///
/// Returns [`CodecError::TooLarge`] before attempting to decode an oversized
/// input, otherwise the same errors as [`from_cbor`].
pub fn from_cbor_limited<T: DeserializeOwned>(bytes: &[u8], limit: usize) -> CodecResult<T> {
    if bytes.len() > limit {
        return Err(CodecError::TooLarge {
            size: bytes.len(),
            limit,
        });
    }
    from_cbor(bytes)
}

/// Trait for types that can be encoded to CBOR.
pub trait Encode {
    /// Encode this value to CBOR bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Trait for types that can be decoded from CBOR.
pub trait Decode: Sized {
    /// Decode this value from CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl<T: Serialize> Encode for T {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_cbor(self)
    }
}

impl<T: DeserializeOwned> Decode for T {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u64,
        tags: BTreeMap<String, Vec<String>>,
    }

    #[test]
    fn roundtrip_struct() {
        let mut tags = BTreeMap::new();
        tags.insert("milk".to_string(), vec!["a".to_string(), "b".to_string()]);
        let value = Sample {
            name: "weekly".into(),
            count: 7,
            tags,
        };

        let bytes = value.encode().unwrap();
        let decoded = Sample::decode(&bytes).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn empty_input_is_eof() {
        let result: CodecResult<u32> = from_cbor(&[]);
        assert_eq!(result, Err(CodecError::UnexpectedEof));
    }

    #[test]
    fn garbage_input_fails() {
        // 0xff is a "break" byte outside of an indefinite container
        let result: CodecResult<Sample> = from_cbor(&[0xff, 0x00, 0x13]);
        assert!(matches!(result, Err(CodecError::DecodingFailed { .. })));
    }

    #[test]
    fn shape_mismatch_fails() {
        let bytes = to_cbor(&"just a string").unwrap();
        let result: CodecResult<Sample> = from_cbor(&bytes);
        assert!(result.is_err());
    }

    #[test]
    fn limited_rejects_oversized_input() {
        let bytes = to_cbor(&vec![0u8; 128]).unwrap();
        let result: CodecResult<Vec<u8>> = from_cbor_limited(&bytes, 16);
        assert!(matches!(result, Err(CodecError::TooLarge { limit: 16, .. })));
    }
}
