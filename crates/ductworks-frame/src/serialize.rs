//! Payload codecs: the serializer/deserializer pair a message duct uses.
//!
//! The framing layer never looks inside a payload; only the encoded length
//! matters on the wire.

use std::error::Error as StdError;
use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Error raised by a payload codec.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error from a user-supplied codec.
    #[error("{0}")]
    Custom(Box<dyn StdError + Send + Sync>),
}

impl CodecError {
    /// Wrap any error (or message) from a custom codec.
    pub fn custom(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Custom(err.into())
    }
}

/// Turns payloads of type `T` into bytes and back.
///
/// `serialize` must accept every value the application sends, and
/// `deserialize` must rebuild an equivalent value from exactly those bytes.
pub trait Codec<T>: Send + Sync {
    fn serialize(&self, payload: &T) -> Result<Bytes, CodecError>;

    fn deserialize(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// UTF-8 encoded JSON, the default codec.
///
/// Invalid UTF-8 in received bytes is replaced with U+FFFD before parsing,
/// so only malformed JSON is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> Codec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn serialize(&self, payload: &T) -> Result<Bytes, CodecError> {
        Ok(serde_json::to_vec(payload)?.into())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<T, CodecError> {
        let text = String::from_utf8_lossy(bytes);
        Ok(serde_json::from_str(&text)?)
    }
}

/// Passes raw bytes through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesCodec;

impl Codec<Bytes> for BytesCodec {
    fn serialize(&self, payload: &Bytes) -> Result<Bytes, CodecError> {
        Ok(payload.clone())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Bytes, CodecError> {
        Ok(Bytes::copy_from_slice(bytes))
    }
}

impl Codec<Vec<u8>> for BytesCodec {
    fn serialize(&self, payload: &Vec<u8>) -> Result<Bytes, CodecError> {
        Ok(Bytes::copy_from_slice(payload))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(bytes.to_vec())
    }
}

/// A codec assembled from a serialize closure and a deserialize closure.
pub struct FnCodec<T, S, D> {
    serialize: S,
    deserialize: D,
    _payload: PhantomData<fn(T) -> T>,
}

/// Build a codec from a pair of functions.
///
/// ```
/// use ductworks_frame::{fn_codec, CodecError};
///
/// let codec = fn_codec(
///     |text: &String| Ok(text.as_bytes().to_vec()),
///     |bytes: &[u8]| String::from_utf8(bytes.to_vec()).map_err(CodecError::custom),
/// );
/// # let _ = codec;
/// ```
pub fn fn_codec<T, S, D>(serialize: S, deserialize: D) -> FnCodec<T, S, D>
where
    S: Fn(&T) -> Result<Vec<u8>, CodecError> + Send + Sync,
    D: Fn(&[u8]) -> Result<T, CodecError> + Send + Sync,
{
    FnCodec {
        serialize,
        deserialize,
        _payload: PhantomData,
    }
}

impl<T, S, D> Codec<T> for FnCodec<T, S, D>
where
    S: Fn(&T) -> Result<Vec<u8>, CodecError> + Send + Sync,
    D: Fn(&[u8]) -> Result<T, CodecError> + Send + Sync,
{
    fn serialize(&self, payload: &T) -> Result<Bytes, CodecError> {
        (self.serialize)(payload).map(Bytes::from)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<T, CodecError> {
        (self.deserialize)(bytes)
    }
}

impl<T, S: Clone, D: Clone> Clone for FnCodec<T, S, D> {
    fn clone(&self) -> Self {
        Self {
            serialize: self.serialize.clone(),
            deserialize: self.deserialize.clone(),
            _payload: PhantomData,
        }
    }
}
