//! OP_MSG: the current wire envelope
//!
//! Flag bits, one or more sections, and an optional trailing CRC32C over
//! the header plus everything before the checksum itself. A message carries
//! exactly one kind-0 ("body") section; section order is significant and
//! survives re-encoding.

use bytes::Bytes;

use crate::bson::{decode_cstring, find_raw, Document, RawDocument};
use crate::error::{Result, WireError};
use crate::wire::header::MsgHeader;

const FLAG_CHECKSUM_PRESENT: u32 = 1;
const FLAG_MORE_TO_COME: u32 = 1 << 1;
const FLAG_EXHAUST_ALLOWED: u32 = 1 << 16;
const KNOWN_FLAGS: u32 = FLAG_CHECKSUM_PRESENT | FLAG_MORE_TO_COME | FLAG_EXHAUST_ALLOWED;

/// OP_MSG flag bits; only `checksumPresent`, `moreToCome` and
/// `exhaustAllowed` are defined, anything else is rejected on decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MsgFlags(u32);

impl MsgFlags {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn from_bits(bits: u32) -> Result<Self> {
        if bits & !KNOWN_FLAGS != 0 {
            return Err(WireError::UnsupportedFlags(bits));
        }
        Ok(Self(bits))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn checksum_present(self) -> bool {
        self.0 & FLAG_CHECKSUM_PRESENT != 0
    }

    pub fn more_to_come(self) -> bool {
        self.0 & FLAG_MORE_TO_COME != 0
    }

    pub fn exhaust_allowed(self) -> bool {
        self.0 & FLAG_EXHAUST_ALLOWED != 0
    }
}

/// One OP_MSG payload unit
#[derive(Debug, Clone, PartialEq)]
pub enum MsgSection {
    /// Kind 0: a single command document
    Body(RawDocument),
    /// Kind 1: a named sequence of documents
    DocumentSequence {
        identifier: String,
        documents: Vec<RawDocument>,
    },
}

impl MsgSection {
    pub fn kind(&self) -> u8 {
        match self {
            MsgSection::Body(_) => 0,
            MsgSection::DocumentSequence { .. } => 1,
        }
    }
}

/// A decoded or constructed OP_MSG body
#[derive(Debug, Clone, PartialEq)]
pub struct OpMsg {
    flags: MsgFlags,
    sections: Vec<MsgSection>,
    checksum: Option<u32>,
}

impl OpMsg {
    /// Wraps a single command document in a flagless message
    pub fn new(doc: &Document) -> Result<Self> {
        Ok(Self {
            flags: MsgFlags::empty(),
            sections: vec![MsgSection::Body(doc.encode()?)],
            checksum: None,
        })
    }

    /// Builds a message from explicit sections.
    ///
    /// Exactly one body section must be present, and a checksum value must
    /// accompany the `checksumPresent` flag.
    pub fn from_sections(
        flags: MsgFlags,
        sections: Vec<MsgSection>,
        checksum: Option<u32>,
    ) -> Result<Self> {
        let bodies = sections
            .iter()
            .filter(|s| matches!(s, MsgSection::Body(_)))
            .count();
        if bodies != 1 {
            return Err(WireError::BodySectionCount(bodies));
        }

        if flags.checksum_present() != checksum.is_some() {
            return Err(WireError::InvalidInput(
                "checksumPresent flag and checksum value must agree".to_owned(),
            ));
        }

        Ok(Self {
            flags,
            sections,
            checksum,
        })
    }

    pub fn flags(&self) -> MsgFlags {
        self.flags
    }

    pub fn sections(&self) -> &[MsgSection] {
        &self.sections
    }

    pub fn checksum(&self) -> Option<u32> {
        self.checksum
    }

    /// The message's single command document, still encoded
    pub fn document(&self) -> &RawDocument {
        self.sections
            .iter()
            .find_map(|s| match s {
                MsgSection::Body(doc) => Some(doc),
                _ => None,
            })
            .expect("OpMsg always contains exactly one body section")
    }

    /// Fully decodes the command document
    pub fn document_deep(&self) -> Result<Document> {
        self.document().decode_deep()
    }

    /// The command name: the first field of the body document
    pub fn command(&self) -> Result<String> {
        let doc = self.document().decode()?;
        Ok(doc.command().unwrap_or_default().to_owned())
    }

    /// Decodes a message body (everything after the header).
    ///
    /// Only framing is validated here: flag bits, section layout, document
    /// length prefixes. Document contents are validated when decoded, and
    /// the checksum is verified separately via [`OpMsg::verify_checksum`]
    /// since it covers the header as well.
    pub fn decode(body: Bytes) -> Result<Self> {
        if body.len() < 4 {
            return Err(WireError::UnexpectedEof);
        }
        let flags = MsgFlags::from_bits(u32::from_le_bytes(body[..4].try_into().unwrap()))?;

        let mut end = body.len();
        let checksum = if flags.checksum_present() {
            if body.len() < 8 {
                return Err(WireError::UnexpectedEof);
            }
            end -= 4;
            Some(u32::from_le_bytes(body[end..].try_into().unwrap()))
        } else {
            None
        };

        let mut sections = Vec::new();
        let mut bodies = 0usize;
        let mut offset = 4;

        while offset < end {
            let kind = body[offset];
            offset += 1;

            match kind {
                0 => {
                    let l = find_raw(&body[offset..end])?;
                    sections.push(MsgSection::Body(RawDocument::from_bytes(
                        body.slice(offset..offset + l),
                    )));
                    offset += l;
                    bodies += 1;
                }

                1 => {
                    if end - offset < 4 {
                        return Err(WireError::UnexpectedEof);
                    }
                    let size =
                        i32::from_le_bytes(body[offset..offset + 4].try_into().unwrap());
                    if size < 5 {
                        return Err(WireError::InvalidInput(format!(
                            "document sequence size {size}"
                        )));
                    }
                    let size = size as usize;
                    if size > end - offset {
                        return Err(WireError::UnexpectedEof);
                    }

                    let section_end = offset + size;
                    let (identifier, n) = decode_cstring(&body[offset + 4..section_end])?;
                    let identifier = identifier.to_owned();

                    let mut pos = offset + 4 + n;
                    let mut documents = Vec::new();
                    while pos < section_end {
                        let l = find_raw(&body[pos..section_end])?;
                        documents.push(RawDocument::from_bytes(body.slice(pos..pos + l)));
                        pos += l;
                    }

                    sections.push(MsgSection::DocumentSequence {
                        identifier,
                        documents,
                    });
                    offset = section_end;
                }

                kind => {
                    return Err(WireError::InvalidInput(format!(
                        "unknown section kind {kind}"
                    )));
                }
            }
        }

        if bodies != 1 {
            return Err(WireError::BodySectionCount(bodies));
        }

        Ok(Self {
            flags,
            sections,
            checksum,
        })
    }

    /// Serialises the body; a decoded message re-encodes bit-exactly,
    /// including the checksum it arrived with
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.flags.bits().to_le_bytes());

        for section in &self.sections {
            buf.push(section.kind());

            match section {
                MsgSection::Body(doc) => buf.extend_from_slice(doc.as_bytes()),

                MsgSection::DocumentSequence {
                    identifier,
                    documents,
                } => {
                    if identifier.contains('\0') {
                        return Err(WireError::NulInName(identifier.clone()));
                    }

                    let docs_len: usize = documents.iter().map(RawDocument::len).sum();
                    let size = 4 + identifier.len() + 1 + docs_len;
                    let size =
                        i32::try_from(size).map_err(|_| WireError::DocumentTooLong(size))?;

                    buf.extend_from_slice(&size.to_le_bytes());
                    buf.extend_from_slice(identifier.as_bytes());
                    buf.push(0);
                    for doc in documents {
                        buf.extend_from_slice(doc.as_bytes());
                    }
                }
            }
        }

        if let Some(checksum) = self.checksum {
            buf.extend_from_slice(&checksum.to_le_bytes());
        }

        Ok(buf)
    }

    /// Verifies the trailing CRC32C of an OP_MSG body when its flags carry
    /// `checksumPresent`.
    ///
    /// The checksum covers the header and the body minus its trailing four
    /// bytes. Verification runs on the raw body, before section parsing:
    /// corrupted contents must surface as a checksum mismatch, not as a
    /// framing error.
    pub fn verify_checksum(header: &MsgHeader, body: &[u8]) -> Result<()> {
        if body.len() < 4 {
            return Err(WireError::UnexpectedEof);
        }
        let flags = MsgFlags::from_bits(u32::from_le_bytes(body[..4].try_into().unwrap()))?;
        if !flags.checksum_present() {
            return Ok(());
        }

        if body.len() < 8 {
            return Err(WireError::UnexpectedEof);
        }
        let expected = u32::from_le_bytes(body[body.len() - 4..].try_into().unwrap());

        let actual = crc32c::crc32c_append(
            crc32c::crc32c(&header.encode()),
            &body[..body.len() - 4],
        );

        if actual != expected {
            return Err(WireError::ChecksumMismatch { expected, actual });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn test_unknown_flag_bits_rejected() {
        assert!(MsgFlags::from_bits(0).is_ok());
        assert!(MsgFlags::from_bits(FLAG_CHECKSUM_PRESENT | FLAG_EXHAUST_ALLOWED).is_ok());
        assert_eq!(
            MsgFlags::from_bits(1 << 2),
            Err(WireError::UnsupportedFlags(1 << 2))
        );
    }

    #[test]
    fn test_simple_message_roundtrip() {
        let msg = OpMsg::new(&doc! { "ping" => 1_i32, "$db" => "test" }).unwrap();
        let bytes = msg.encode().unwrap();

        let decoded = OpMsg::decode(Bytes::from(bytes.clone())).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.encode().unwrap(), bytes);
        assert_eq!(decoded.command().unwrap(), "ping");
    }

    #[test]
    fn test_zero_body_sections_rejected() {
        let doc = doc! { "a" => 1_i32 }.encode().unwrap();

        // a single kind-1 section, no body
        let mut body = Vec::new();
        body.extend_from_slice(&0u32.to_le_bytes());
        body.push(1);
        let size = 4 + 5 + doc.len();
        body.extend_from_slice(&(size as i32).to_le_bytes());
        body.extend_from_slice(b"docs\0");
        body.extend_from_slice(doc.as_bytes());

        assert_eq!(
            OpMsg::decode(Bytes::from(body)),
            Err(WireError::BodySectionCount(0))
        );
    }

    #[test]
    fn test_two_body_sections_rejected() {
        let doc = doc! { "a" => 1_i32 }.encode().unwrap();

        let mut body = Vec::new();
        body.extend_from_slice(&0u32.to_le_bytes());
        for _ in 0..2 {
            body.push(0);
            body.extend_from_slice(doc.as_bytes());
        }

        assert_eq!(
            OpMsg::decode(Bytes::from(body)),
            Err(WireError::BodySectionCount(2))
        );
    }

    #[test]
    fn test_from_sections_enforces_single_body() {
        let doc = doc! { "a" => 1_i32 }.encode().unwrap();

        let err = OpMsg::from_sections(
            MsgFlags::empty(),
            vec![
                MsgSection::Body(doc.clone()),
                MsgSection::Body(doc.clone()),
            ],
            None,
        )
        .unwrap_err();
        assert_eq!(err, WireError::BodySectionCount(2));

        let err =
            OpMsg::from_sections(MsgFlags::empty(), vec![], None).unwrap_err();
        assert_eq!(err, WireError::BodySectionCount(0));
    }

    #[test]
    fn test_unknown_section_kind_rejected() {
        let mut body = Vec::new();
        body.extend_from_slice(&0u32.to_le_bytes());
        body.push(2);
        body.extend_from_slice(&[5, 0, 0, 0, 0]);

        assert!(matches!(
            OpMsg::decode(Bytes::from(body)),
            Err(WireError::InvalidInput(_))
        ));
    }
}
