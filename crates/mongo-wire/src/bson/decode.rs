//! BSON decoding
//!
//! Input bytes are untrusted. Every offset is bounds-checked before the
//! corresponding read; malformed input fails without over-reading and
//! without allocating more than the input size.

use crate::bson::raw::{find_raw, RawArray, RawDocument};
use crate::bson::value::*;
use crate::bson::{Array, Document};
use crate::error::{Result, WireError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DecodeMode {
    /// Nested documents and arrays stay as raw subslices
    Shallow,
    /// The whole tree is materialised
    Deep,
}

/// Ensures `buf[offset..offset + need]` is readable
fn check_offset(buf: &[u8], offset: usize, need: usize) -> Result<()> {
    match offset.checked_add(need) {
        Some(end) if end <= buf.len() => Ok(()),
        _ => Err(WireError::UnexpectedEof),
    }
}

/// Decodes a NUL-terminated UTF-8 string, returning it with the number of
/// bytes consumed (including the terminator)
pub(crate) fn decode_cstring(buf: &[u8]) -> Result<(&str, usize)> {
    let Some(nul) = buf.iter().position(|&b| b == 0) else {
        return Err(WireError::UnexpectedEof);
    };

    let s = std::str::from_utf8(&buf[..nul]).map_err(|_| WireError::InvalidUtf8)?;
    Ok((s, nul + 1))
}

pub(crate) fn decode_document(raw: &RawDocument, mode: DecodeMode) -> Result<Document> {
    let buf = raw.as_bytes();

    let l = find_raw(buf)?;
    if l != buf.len() {
        return Err(WireError::InvalidInput(format!(
            "document length {l} does not cover the whole {} byte input",
            buf.len()
        )));
    }

    let mut doc = Document::new();
    let mut offset = 4;

    loop {
        check_offset(buf, offset, 1)?;
        let tag = buf[offset];

        if tag == 0 {
            if offset + 1 != buf.len() {
                return Err(WireError::InvalidInput(format!(
                    "terminator at offset {offset} leaves trailing bytes"
                )));
            }
            return Ok(doc);
        }

        offset += 1;

        let (name, n) = decode_cstring(&buf[offset..])?;
        let name = name.to_owned();
        offset += n;

        let value = match tag {
            TAG_DOCUMENT => {
                let l = find_raw(&buf[offset..]).map_err(|e| {
                    WireError::InvalidInput(format!("no document at offset {offset}: {e}"))
                })?;
                let nested = RawDocument::from_bytes(raw.slice(offset, offset + l));
                offset += l;

                match mode {
                    DecodeMode::Shallow => Value::RawDocument(nested),
                    DecodeMode::Deep => Value::Document(decode_document(&nested, mode)?),
                }
            }

            TAG_ARRAY => {
                let l = find_raw(&buf[offset..]).map_err(|e| {
                    WireError::InvalidInput(format!("no array at offset {offset}: {e}"))
                })?;
                let nested = RawArray::from_bytes(raw.slice(offset, offset + l));
                offset += l;

                match mode {
                    DecodeMode::Shallow => Value::RawArray(nested),
                    DecodeMode::Deep => Value::Array(decode_array(&nested, mode)?),
                }
            }

            _ => {
                let (value, n) = decode_scalar(&buf[offset..], tag)?;
                offset += n;
                value
            }
        };

        doc.insert(name, value)?;
    }
}

pub(crate) fn decode_array(raw: &RawArray, mode: DecodeMode) -> Result<Array> {
    let doc = decode_document(&raw.as_raw_document(), mode)?;

    let mut values = Vec::with_capacity(doc.len());
    for (index, (name, value)) in doc.iter().enumerate() {
        if name != index.to_string() {
            return Err(WireError::InvalidInput(format!(
                "array element {index} has name {name:?}"
            )));
        }
        values.push(value.clone());
    }

    Ok(values.into_iter().collect())
}

/// Decodes one scalar value, returning it with the number of bytes consumed
fn decode_scalar(buf: &[u8], tag: u8) -> Result<(Value, usize)> {
    match tag {
        TAG_DOUBLE => {
            check_offset(buf, 0, 8)?;
            let v = f64::from_le_bytes(buf[..8].try_into().unwrap());
            Ok((Value::Double(v), 8))
        }

        TAG_STRING => {
            let (s, n) = decode_string(buf)?;
            Ok((Value::String(s), n))
        }

        TAG_BINARY => {
            check_offset(buf, 0, 5)?;
            let l = i32::from_le_bytes(buf[..4].try_into().unwrap());
            if l < 0 {
                return Err(WireError::InvalidInput(format!("binary length {l}")));
            }
            let l = l as usize;
            check_offset(buf, 5, l)?;

            let subtype = BinarySubtype::from_u8(buf[4])
                .ok_or(WireError::InvalidBinarySubtype(buf[4]))?;
            let bytes = buf[5..5 + l].to_vec();

            Ok((Value::Binary(Binary { subtype, bytes }), 5 + l))
        }

        TAG_OBJECT_ID => {
            check_offset(buf, 0, 12)?;
            Ok((
                Value::ObjectId(ObjectId(buf[..12].try_into().unwrap())),
                12,
            ))
        }

        TAG_BOOL => {
            check_offset(buf, 0, 1)?;
            let v = match buf[0] {
                0 => false,
                1 => true,
                b => {
                    return Err(WireError::InvalidInput(format!("boolean byte 0x{b:02x}")));
                }
            };
            Ok((Value::Bool(v), 1))
        }

        TAG_DATE_TIME => {
            check_offset(buf, 0, 8)?;
            let v = i64::from_le_bytes(buf[..8].try_into().unwrap());
            Ok((Value::DateTime(v), 8))
        }

        TAG_NULL => Ok((Value::Null, 0)),

        TAG_REGEX => {
            let (pattern, n1) = decode_cstring(buf)?;
            let pattern = pattern.to_owned();
            let (options, n2) = decode_cstring(&buf[n1..])?;
            let options = options.to_owned();
            Ok((Value::Regex(Regex { pattern, options }), n1 + n2))
        }

        TAG_INT32 => {
            check_offset(buf, 0, 4)?;
            let v = i32::from_le_bytes(buf[..4].try_into().unwrap());
            Ok((Value::Int32(v), 4))
        }

        TAG_TIMESTAMP => {
            check_offset(buf, 0, 8)?;
            let v = u64::from_le_bytes(buf[..8].try_into().unwrap());
            Ok((Value::Timestamp(Timestamp(v)), 8))
        }

        TAG_INT64 => {
            check_offset(buf, 0, 8)?;
            let v = i64::from_le_bytes(buf[..8].try_into().unwrap());
            Ok((Value::Int64(v), 8))
        }

        TAG_DECIMAL128 => {
            check_offset(buf, 0, 16)?;
            let l = u64::from_le_bytes(buf[..8].try_into().unwrap());
            let h = u64::from_le_bytes(buf[8..16].try_into().unwrap());
            Ok((Value::Decimal128(Decimal128 { l, h }), 16))
        }

        _ => Err(WireError::InvalidTag(tag)),
    }
}

/// Decodes a length-prefixed string; the announced length includes the
/// trailing NUL
fn decode_string(buf: &[u8]) -> Result<(String, usize)> {
    check_offset(buf, 0, 4)?;
    let l = i32::from_le_bytes(buf[..4].try_into().unwrap());
    if l < 1 {
        return Err(WireError::InvalidInput(format!("string length {l}")));
    }

    let l = l as usize;
    check_offset(buf, 4, l)?;
    if buf[4 + l - 1] != 0 {
        return Err(WireError::InvalidInput(
            "string is not NUL-terminated".to_owned(),
        ));
    }

    let s = std::str::from_utf8(&buf[4..4 + l - 1]).map_err(|_| WireError::InvalidUtf8)?;
    Ok((s.to_owned(), 4 + l))
}
