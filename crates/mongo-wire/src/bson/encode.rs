//! BSON encoding
//!
//! Encoding cannot fail on well-formed in-memory values; the only error
//! conditions are NUL bytes inside names and int32 length overflow.

use crate::bson::value::Value;
use crate::bson::{Array, Document};
use crate::error::{Result, WireError};

pub(crate) fn encode_document(doc: &Document) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&[0u8; 4]);

    for (name, value) in doc.iter() {
        buf.push(value.tag());
        encode_cstring(&mut buf, name)?;
        encode_value(&mut buf, value)?;
    }

    buf.push(0);
    patch_length(&mut buf)?;
    Ok(buf)
}

pub(crate) fn encode_array(arr: &Array) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&[0u8; 4]);

    for (index, value) in arr.iter().enumerate() {
        buf.push(value.tag());
        encode_cstring(&mut buf, &index.to_string())?;
        encode_value(&mut buf, value)?;
    }

    buf.push(0);
    patch_length(&mut buf)?;
    Ok(buf)
}

fn patch_length(buf: &mut [u8]) -> Result<()> {
    let l = i32::try_from(buf.len()).map_err(|_| WireError::DocumentTooLong(buf.len()))?;
    buf[..4].copy_from_slice(&l.to_le_bytes());
    Ok(())
}

fn encode_cstring(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    if s.contains('\0') {
        return Err(WireError::NulInName(s.to_owned()));
    }
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    Ok(())
}

fn encode_value(buf: &mut Vec<u8>, value: &Value) -> Result<()> {
    match value {
        // to_le_bytes is a bit reinterpretation: NaN payloads and the sign
        // of zero are written out unchanged
        Value::Double(v) => buf.extend_from_slice(&v.to_le_bytes()),

        Value::String(s) => {
            let l = i32::try_from(s.len() + 1).map_err(|_| WireError::StringTooLong(s.len()))?;
            buf.extend_from_slice(&l.to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
            buf.push(0);
        }

        Value::Document(d) => buf.extend_from_slice(&encode_document(d)?),
        Value::Array(a) => buf.extend_from_slice(&encode_array(a)?),
        Value::RawDocument(raw) => buf.extend_from_slice(raw.as_bytes()),
        Value::RawArray(raw) => buf.extend_from_slice(raw.as_bytes()),

        Value::Binary(b) => {
            let l = i32::try_from(b.bytes.len())
                .map_err(|_| WireError::StringTooLong(b.bytes.len()))?;
            buf.extend_from_slice(&l.to_le_bytes());
            buf.push(b.subtype.as_u8());
            buf.extend_from_slice(&b.bytes);
        }

        Value::ObjectId(id) => buf.extend_from_slice(&id.0),

        Value::Bool(v) => buf.push(u8::from(*v)),

        Value::DateTime(v) => buf.extend_from_slice(&v.to_le_bytes()),

        Value::Null => {}

        Value::Regex(r) => {
            encode_cstring(buf, &r.pattern)?;
            encode_cstring(buf, &r.options)?;
        }

        Value::Int32(v) => buf.extend_from_slice(&v.to_le_bytes()),

        Value::Timestamp(ts) => buf.extend_from_slice(&ts.0.to_le_bytes()),

        Value::Int64(v) => buf.extend_from_slice(&v.to_le_bytes()),

        Value::Decimal128(d) => {
            buf.extend_from_slice(&d.l.to_le_bytes());
            buf.extend_from_slice(&d.h.to_le_bytes());
        }
    }

    Ok(())
}
