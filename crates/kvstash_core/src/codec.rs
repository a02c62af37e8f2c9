//! Value codecs for typed storage items.
//!
//! A codec turns an item's value into the raw string a backend stores and
//! back. [`JsonCodec`] is the default for any serde type; [`StringCodec`]
//! stores strings verbatim; [`FnCodec`] adapts a pair of closures.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use thiserror::Error;

/// Error produced by a codec.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CodecError {
    message: String,
}

impl CodecError {
    /// Creates a codec error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Converts values of type `T` to and from raw backend strings.
///
/// The encoding must be deterministic - equal values must produce equal
/// strings - so that unchanged reads can be recognized.
pub trait Codec<T>: Send + Sync {
    /// Encodes a value to its raw form.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented.
    fn encode(&self, value: &T) -> Result<String, CodecError>;

    /// Decodes a value from its raw form.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not a valid encoding.
    fn decode(&self, raw: &str) -> Result<T, CodecError>;
}

/// JSON codec for any serde type.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl<T> Codec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }

    fn decode(&self, raw: &str) -> Result<T, CodecError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Stores strings verbatim.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringCodec;

impl Codec<String> for StringCodec {
    fn encode(&self, value: &String) -> Result<String, CodecError> {
        Ok(value.clone())
    }

    fn decode(&self, raw: &str) -> Result<String, CodecError> {
        Ok(raw.to_string())
    }
}

/// A codec built from an encode closure and a decode closure.
///
/// # Example
///
/// ```rust
/// use kvstash_core::{Codec, CodecError, FnCodec};
///
/// let codec = FnCodec::new(
///     |v: &u32| Ok(format!("{v:x}")),
///     |raw: &str| u32::from_str_radix(raw, 16).map_err(|e| CodecError::new(e.to_string())),
/// );
/// assert_eq!(codec.encode(&255).unwrap(), "ff");
/// assert_eq!(codec.decode("ff").unwrap(), 255);
/// ```
pub struct FnCodec<T, E, D> {
    encode: E,
    decode: D,
    _marker: PhantomData<fn() -> T>,
}

impl<T, E, D> FnCodec<T, E, D>
where
    E: Fn(&T) -> Result<String, CodecError> + Send + Sync,
    D: Fn(&str) -> Result<T, CodecError> + Send + Sync,
{
    /// Creates a codec from closures.
    pub fn new(encode: E, decode: D) -> Self {
        Self {
            encode,
            decode,
            _marker: PhantomData,
        }
    }
}

impl<T, E, D> Codec<T> for FnCodec<T, E, D>
where
    E: Fn(&T) -> Result<String, CodecError> + Send + Sync,
    D: Fn(&str) -> Result<T, CodecError> + Send + Sync,
{
    fn encode(&self, value: &T) -> Result<String, CodecError> {
        (self.encode)(value)
    }

    fn decode(&self, raw: &str) -> Result<T, CodecError> {
        (self.decode)(raw)
    }
}

impl<T, E, D> fmt::Debug for FnCodec<T, E, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCodec").finish_non_exhaustive()
    }
}
