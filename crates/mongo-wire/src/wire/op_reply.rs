//! OP_REPLY: the legacy server reply envelope
//!
//! Servers answer the initial OP_QUERY handshake with OP_REPLY; everything
//! after authentication uses OP_MSG. In practice a reply carries a single
//! document.

use bytes::Bytes;

use crate::bson::{find_raw, Document, RawDocument};
use crate::error::{Result, WireError};

const FLAG_CURSOR_NOT_FOUND: u32 = 1;
const FLAG_QUERY_FAILURE: u32 = 1 << 1;
const FLAG_SHARD_CONFIG_STALE: u32 = 1 << 2;
const FLAG_AWAIT_CAPABLE: u32 = 1 << 3;

/// OP_REPLY response flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplyFlags(u32);

impl ReplyFlags {
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn cursor_not_found(self) -> bool {
        self.0 & FLAG_CURSOR_NOT_FOUND != 0
    }

    pub fn query_failure(self) -> bool {
        self.0 & FLAG_QUERY_FAILURE != 0
    }

    pub fn shard_config_stale(self) -> bool {
        self.0 & FLAG_SHARD_CONFIG_STALE != 0
    }

    pub fn await_capable(self) -> bool {
        self.0 & FLAG_AWAIT_CAPABLE != 0
    }
}

/// A decoded or constructed OP_REPLY body
#[derive(Debug, Clone, PartialEq)]
pub struct OpReply {
    pub flags: ReplyFlags,
    pub cursor_id: i64,
    pub starting_from: i32,
    documents: Vec<RawDocument>,
}

impl OpReply {
    pub fn new(
        flags: ReplyFlags,
        cursor_id: i64,
        starting_from: i32,
        documents: Vec<RawDocument>,
    ) -> Self {
        Self {
            flags,
            cursor_id,
            starting_from,
            documents,
        }
    }

    pub fn number_returned(&self) -> i32 {
        self.documents.len() as i32
    }

    pub fn documents(&self) -> &[RawDocument] {
        &self.documents
    }

    /// The first returned document, if any
    pub fn document(&self) -> Option<&RawDocument> {
        self.documents.first()
    }

    /// Fully decodes the first returned document
    pub fn document_deep(&self) -> Result<Option<Document>> {
        self.document().map(RawDocument::decode_deep).transpose()
    }

    pub fn decode(body: Bytes) -> Result<Self> {
        if body.len() < 20 {
            return Err(WireError::UnexpectedEof);
        }

        let flags = ReplyFlags(u32::from_le_bytes(body[0..4].try_into().unwrap()));
        let cursor_id = i64::from_le_bytes(body[4..12].try_into().unwrap());
        let starting_from = i32::from_le_bytes(body[12..16].try_into().unwrap());
        let number_returned = i32::from_le_bytes(body[16..20].try_into().unwrap());

        if number_returned < 0 {
            return Err(WireError::InvalidInput(format!(
                "negative NumberReturned {number_returned}"
            )));
        }

        let mut documents = Vec::new();
        let mut offset = 20;
        for _ in 0..number_returned {
            let l = find_raw(&body[offset..])?;
            documents.push(RawDocument::from_bytes(body.slice(offset..offset + l)));
            offset += l;
        }

        if offset != body.len() {
            return Err(WireError::InvalidInput(format!(
                "{} trailing bytes after {number_returned} documents",
                body.len() - offset
            )));
        }

        Ok(Self {
            flags,
            cursor_id,
            starting_from,
            documents,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.flags.bits().to_le_bytes());
        buf.extend_from_slice(&self.cursor_id.to_le_bytes());
        buf.extend_from_slice(&self.starting_from.to_le_bytes());
        buf.extend_from_slice(&self.number_returned().to_le_bytes());
        for doc in &self.documents {
            buf.extend_from_slice(doc.as_bytes());
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn test_reply_roundtrip() {
        let doc = doc! { "ok" => 1.0 }.encode().unwrap();
        let reply = OpReply::new(ReplyFlags::from_bits(FLAG_AWAIT_CAPABLE), 0, 0, vec![doc]);

        let bytes = reply.encode().unwrap();
        let decoded = OpReply::decode(Bytes::from(bytes.clone())).unwrap();

        assert_eq!(decoded, reply);
        assert_eq!(decoded.number_returned(), 1);
        assert!(decoded.flags.await_capable());
        assert!(!decoded.flags.query_failure());
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn test_document_count_must_match() {
        let doc = doc! { "ok" => 1.0 }.encode().unwrap();
        let reply = OpReply::new(ReplyFlags::default(), 0, 0, vec![doc]);

        // claim two documents but carry one
        let mut bytes = reply.encode().unwrap();
        bytes[16..20].copy_from_slice(&2i32.to_le_bytes());

        assert!(OpReply::decode(Bytes::from(bytes)).is_err());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let doc = doc! { "ok" => 1.0 }.encode().unwrap();
        let reply = OpReply::new(ReplyFlags::default(), 0, 0, vec![doc]);

        let mut bytes = reply.encode().unwrap();
        bytes.push(0xaa);

        assert!(matches!(
            OpReply::decode(Bytes::from(bytes)),
            Err(WireError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_short_body_rejected() {
        assert_eq!(
            OpReply::decode(Bytes::from(vec![0u8; 19])),
            Err(WireError::UnexpectedEof)
        );
    }
}
