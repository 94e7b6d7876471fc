//! Member serialization.
//!
//! A [`ValueConverter`] turns typed members into the bytes stored as sorted
//! set members and back. It is injected into each handle, so one store can
//! hold JSON members in one key and raw strings in another.

use crate::error::{Result, StoreError};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// Serialize/deserialize capability for member type `T`.
///
/// Implementations must be deterministic: the same value always produces the
/// same bytes, otherwise `ZADD` would create duplicates instead of updating.
pub trait ValueConverter<T>: Send + Sync {
    fn serialize(&self, value: &T) -> Result<Bytes>;

    fn deserialize(&self, bytes: &[u8]) -> Result<T>;
}

/// Stores members as compact JSON via `serde_json`.
pub struct JsonConverter<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonConverter<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonConverter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for JsonConverter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonConverter")
    }
}

impl<T> ValueConverter<T> for JsonConverter<T>
where
    T: Serialize + DeserializeOwned,
{
    fn serialize(&self, value: &T) -> Result<Bytes> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(StoreError::serialization)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(StoreError::serialization)
    }
}

/// Stores `String` members as their UTF-8 bytes, unquoted.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringConverter;

impl ValueConverter<String> for StringConverter {
    fn serialize(&self, value: &String) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(value.as_bytes()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec()).map_err(StoreError::serialization)
    }
}

/// Passes raw bytes through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesConverter;

impl ValueConverter<Bytes> for BytesConverter {
    fn serialize(&self, value: &Bytes) -> Result<Bytes> {
        Ok(value.clone())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Player {
        id: u32,
        name: String,
    }

    #[test]
    fn test_json_converter() {
        let conv = JsonConverter::<Player>::new();
        let player = Player {
            id: 7,
            name: "ariz".to_string(),
        };

        let bytes = conv.serialize(&player).unwrap();
        assert_eq!(&bytes[..], br#"{"id":7,"name":"ariz"}"#);
        assert_eq!(conv.deserialize(&bytes).unwrap(), player);
    }

    #[test]
    fn test_json_converter_rejects_mismatched_type() {
        let conv = JsonConverter::<Player>::new();
        let err = conv.deserialize(b"\"just a string\"").unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[test]
    fn test_string_converter() {
        let conv = StringConverter;
        let bytes = conv.serialize(&"alice".to_string()).unwrap();
        assert_eq!(&bytes[..], b"alice");
        assert!(matches!(
            conv.deserialize(&[0xff, 0xfe]),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_bytes_converter() {
        let conv = BytesConverter;
        let raw = Bytes::from_static(b"\x00\x01");
        assert_eq!(conv.serialize(&raw).unwrap(), raw);
        assert_eq!(conv.deserialize(b"\x00\x01").unwrap(), raw);
    }
}
