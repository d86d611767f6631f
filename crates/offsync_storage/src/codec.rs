//! CBOR value codec.
//!
//! Values are opaque bytes to the log; this is the one place that turns
//! typed rows into those bytes and back.

use crate::error::{StorageError, StorageResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value to CBOR.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> StorageResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StorageError::Codec(e.to_string()))?;
    Ok(buf)
}

/// Decodes a value from CBOR.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Codec(e.to_string()))
}
