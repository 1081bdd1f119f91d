//! Undecoded documents and arrays
//!
//! A [`RawDocument`] is a byte slice known to start with a document length
//! prefix. It usually references part of a larger buffer: nested raw
//! documents produced by a shallow decode share storage with their parent.

use bytes::Bytes;

use crate::bson::decode::{self, DecodeMode};
use crate::bson::{Array, Document};
use crate::error::{Result, WireError};

/// Reads a document length prefix and returns the announced size in bytes.
///
/// Only the first four bytes are examined. Fails if the buffer is shorter
/// than four bytes, the declared length is below the five-byte minimum, or
/// the declared length exceeds the buffer.
pub fn find_raw(buf: &[u8]) -> Result<usize> {
    let Some(prefix) = buf.get(..4) else {
        return Err(WireError::UnexpectedEof);
    };

    let l = i32::from_le_bytes(prefix.try_into().expect("4-byte slice"));
    if l < 5 {
        return Err(WireError::InvalidInput(format!(
            "document length {l} is below the 5 byte minimum"
        )));
    }

    let l = l as usize;
    if l > buf.len() {
        return Err(WireError::InvalidInput(format!(
            "document length {l} exceeds the {} available bytes",
            buf.len()
        )));
    }

    Ok(l)
}

/// A single BSON document in binary form
#[derive(Clone, PartialEq, Eq)]
pub struct RawDocument(Bytes);

impl RawDocument {
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self(bytes)
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn slice(&self, start: usize, end: usize) -> Bytes {
        self.0.slice(start..end)
    }

    /// Decodes the top-level fields only.
    ///
    /// Nested documents and arrays become [`RawDocument`]/[`RawArray`]
    /// subslices of this buffer, without copying.
    pub fn decode(&self) -> Result<Document> {
        decode::decode_document(self, DecodeMode::Shallow)
    }

    /// Decodes the whole document tree recursively
    pub fn decode_deep(&self) -> Result<Document> {
        decode::decode_document(self, DecodeMode::Deep)
    }
}

impl std::fmt::Debug for RawDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawDocument({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for RawDocument {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_vec(bytes)
    }
}

/// A single BSON array in binary form
#[derive(Clone, PartialEq, Eq)]
pub struct RawArray(Bytes);

impl RawArray {
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self(bytes)
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn as_raw_document(&self) -> RawDocument {
        RawDocument(self.0.clone())
    }

    /// Decodes the top-level elements only; see [`RawDocument::decode`]
    pub fn decode(&self) -> Result<Array> {
        decode::decode_array(self, DecodeMode::Shallow)
    }

    /// Decodes the whole array tree recursively
    pub fn decode_deep(&self) -> Result<Array> {
        decode::decode_array(self, DecodeMode::Deep)
    }
}

impl std::fmt::Debug for RawArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawArray({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for RawArray {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_vec(bytes)
    }
}
