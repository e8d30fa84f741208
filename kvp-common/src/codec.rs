//! # Binary-Safe Payload Codec
//!
//! Purpose: Let arbitrary byte payloads travel through text-oriented commands
//! and channels, and come back byte-identical.
//!
//! ## Design Principles
//! 1. **Tagged Text**: Binary payloads are written as `BINARY_SENTINEL` followed
//!    by the codec's text form; anything without the sentinel is plain text.
//! 2. **Pluggable Codec**: `TextCodec` is the seam; `Base64Codec` is the default.
//! 3. **Typed Payloads**: `Payload` keeps text and bytes apart at the type level.
//!
//! ## Wire Form
//!
//! ```text
//! Payload::Text("hello")        -> "hello"
//! Payload::Binary([0xff, 0x00]) -> "\x01kvp:b64:" + "/wA="
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{ClientError, ClientResult};

/// Marker prefixed to every encoded binary payload.
pub const BINARY_SENTINEL: &str = "\u{1}kvp:b64:";

/// Reversible bytes <-> text encoding.
pub trait TextCodec: Send + Sync {
    /// Encodes raw bytes as text.
    fn encode(&self, bytes: &[u8]) -> String;
    /// Decodes text produced by `encode` back into bytes.
    fn decode(&self, text: &str) -> ClientResult<Vec<u8>>;
}

/// Standard-alphabet base64 codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Codec;

impl TextCodec for Base64Codec {
    fn encode(&self, bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }

    fn decode(&self, text: &str) -> ClientResult<Vec<u8>> {
        STANDARD
            .decode(text)
            .map_err(|err| ClientError::Codec(err.to_string()))
    }
}

/// A command argument or message body: text or raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Payload {
    /// UTF-8 text, sent verbatim.
    Text(String),
    /// Raw bytes, sent through the codec behind the sentinel.
    Binary(Vec<u8>),
}

impl Payload {
    /// Returns the payload as bytes (text as UTF-8, binary as-is).
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Binary(bytes) => bytes,
        }
    }

    /// Returns the text when this is a text payload.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Binary(_) => None,
        }
    }

    /// Consumes the payload and returns its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Payload::Text(text) => text.into_bytes(),
            Payload::Binary(bytes) => bytes,
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Binary(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Binary(bytes.to_vec())
    }
}

/// Encodes one payload into the bytes placed on the wire.
pub fn encode_payload(codec: &dyn TextCodec, payload: &Payload) -> Vec<u8> {
    match payload {
        Payload::Text(text) => text.as_bytes().to_vec(),
        Payload::Binary(bytes) => {
            let encoded = codec.encode(bytes);
            let mut out = Vec::with_capacity(BINARY_SENTINEL.len() + encoded.len());
            out.extend_from_slice(BINARY_SENTINEL.as_bytes());
            out.extend_from_slice(encoded.as_bytes());
            out
        }
    }
}

/// Decodes wire bytes into a payload.
///
/// Sentinel-prefixed data goes through the codec; other data is passed
/// through verbatim as text when it is valid UTF-8, else as raw bytes.
pub fn decode_payload(codec: &dyn TextCodec, raw: &[u8]) -> ClientResult<Payload> {
    if let Some(rest) = raw.strip_prefix(BINARY_SENTINEL.as_bytes()) {
        let text = std::str::from_utf8(rest)
            .map_err(|_| ClientError::Codec("encoded payload is not UTF-8".to_string()))?;
        return Ok(Payload::Binary(codec.decode(text)?));
    }

    match String::from_utf8(raw.to_vec()) {
        Ok(text) => Ok(Payload::Text(text)),
        Err(err) => Ok(Payload::Binary(err.into_bytes())),
    }
}
