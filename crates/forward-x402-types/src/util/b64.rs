//! Base64 encoding and decoding utilities.
//!
//! Payment proofs travel in the `X-PAYMENT` request header and settlement receipts in the
//! `X-PAYMENT-RESPONSE` response header, both as standard base64 over a JSON document.
//! [`Base64Bytes`] holds the raw base64 text; [`encode_json`] and [`decode_json`] move
//! typed values across that boundary.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::fmt::Display;

/// A wrapper for base64-encoded byte data.
///
/// # Example
///
/// ```rust
/// use forward_x402_types::util::Base64Bytes;
///
/// let encoded = Base64Bytes::encode(b"hello world");
/// assert_eq!(encoded.to_string(), "aGVsbG8gd29ybGQ=");
/// assert_eq!(encoded.decode().unwrap(), b"hello world");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Bytes<'a>(pub Cow<'a, [u8]>);

impl Base64Bytes<'_> {
    /// Decodes the base64 string bytes to raw binary data.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        b64.decode(&self.0)
    }

    /// Encodes raw binary data into base64 string bytes.
    pub fn encode<T: AsRef<[u8]>>(input: T) -> Base64Bytes<'static> {
        let encoded = b64.encode(input.as_ref());
        Base64Bytes(Cow::Owned(encoded.into_bytes()))
    }
}

impl AsRef<[u8]> for Base64Bytes<'_> {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl<'a> From<&'a [u8]> for Base64Bytes<'a> {
    fn from(slice: &'a [u8]) -> Self {
        Base64Bytes(Cow::Borrowed(slice))
    }
}

impl<'a> From<&'a str> for Base64Bytes<'a> {
    fn from(value: &'a str) -> Self {
        Base64Bytes(Cow::Borrowed(value.as_bytes()))
    }
}

impl Display for Base64Bytes<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.0.as_ref()))
    }
}

/// Errors crossing the base64 + JSON transport boundary.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// The header was not valid base64, not valid JSON, or not the expected shape.
    #[error("Malformed payload: {0}")]
    Malformed(String),
    /// The value could not be serialized to JSON.
    #[error("Encoding failed: {0}")]
    Encoding(#[source] serde_json::Error),
}

/// Serializes `value` to JSON and encodes the result as standard base64.
pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<String, PayloadError> {
    let json = serde_json::to_vec(value).map_err(PayloadError::Encoding)?;
    Ok(Base64Bytes::encode(json).to_string())
}

/// Decodes standard base64 and parses the bytes as JSON into `T`.
pub fn decode_json<T: DeserializeOwned>(encoded: &[u8]) -> Result<T, PayloadError> {
    let bytes = Base64Bytes::from(encoded)
        .decode()
        .map_err(|e| PayloadError::Malformed(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| PayloadError::Malformed(e.to_string()))
}
