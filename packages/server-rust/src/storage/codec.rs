//! MessagePack value codec shared by the cache store and the ledger backends.
//!
//! Values are encoded with named fields (`rmp_serde::to_vec_named`) so that a
//! stored entry survives field reordering between releases.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Failure to encode or decode a stored value.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode value: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to decode value: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Encodes a value into MessagePack bytes.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if the value cannot be serialized.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, CodecError> {
    Ok(Bytes::from(rmp_serde::to_vec_named(value)?))
}

/// Decodes a MessagePack value.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if the bytes are not a valid encoding of `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(rmp_serde::from_slice(bytes)?)
}
