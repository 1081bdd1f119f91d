//! OP_QUERY: the legacy request envelope
//!
//! Constructed only for the initial handshake against servers that predate
//! OP_MSG; decoding legacy requests is out of scope.

use crate::bson::{Document, RawDocument};
use crate::error::{Result, WireError};

/// An OP_QUERY body, encode-only
#[derive(Debug, Clone, PartialEq)]
pub struct OpQuery {
    pub flags: u32,
    pub full_collection_name: String,
    pub number_to_skip: i32,
    pub number_to_return: i32,
    query: RawDocument,
}

impl OpQuery {
    /// A handshake-style query against `<db>.$cmd`
    pub fn new(full_collection_name: impl Into<String>, query: &Document) -> Result<Self> {
        Ok(Self {
            flags: 0,
            full_collection_name: full_collection_name.into(),
            number_to_skip: 0,
            number_to_return: -1,
            query: query.encode()?,
        })
    }

    pub fn query(&self) -> &RawDocument {
        &self.query
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.full_collection_name.contains('\0') {
            return Err(WireError::NulInName(self.full_collection_name.clone()));
        }

        let mut buf = Vec::new();
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.extend_from_slice(self.full_collection_name.as_bytes());
        buf.push(0);
        buf.extend_from_slice(&self.number_to_skip.to_le_bytes());
        buf.extend_from_slice(&self.number_to_return.to_le_bytes());
        buf.extend_from_slice(self.query.as_bytes());
        Ok(buf)
    }
}
