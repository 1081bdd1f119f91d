//! BSON value model
//!
//! A single tagged enum covers every element type this codec understands.
//! Shallow-decoded documents hold their nested documents and arrays as
//! [`RawDocument`]/[`RawArray`] subslices of the input buffer.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::bson::{Array, Document, RawArray, RawDocument};

pub(crate) const TAG_DOUBLE: u8 = 0x01;
pub(crate) const TAG_STRING: u8 = 0x02;
pub(crate) const TAG_DOCUMENT: u8 = 0x03;
pub(crate) const TAG_ARRAY: u8 = 0x04;
pub(crate) const TAG_BINARY: u8 = 0x05;
pub(crate) const TAG_OBJECT_ID: u8 = 0x07;
pub(crate) const TAG_BOOL: u8 = 0x08;
pub(crate) const TAG_DATE_TIME: u8 = 0x09;
pub(crate) const TAG_NULL: u8 = 0x0a;
pub(crate) const TAG_REGEX: u8 = 0x0b;
pub(crate) const TAG_INT32: u8 = 0x10;
pub(crate) const TAG_TIMESTAMP: u8 = 0x11;
pub(crate) const TAG_INT64: u8 = 0x12;
pub(crate) const TAG_DECIMAL128: u8 = 0x13;

/// A single BSON value
#[derive(Debug, Clone)]
pub enum Value {
    /// IEEE 754 binary64; NaN payloads and the sign of zero survive round trips
    Double(f64),
    String(String),
    Document(Document),
    Array(Array),
    Binary(Binary),
    ObjectId(ObjectId),
    Bool(bool),
    /// Milliseconds since the Unix epoch
    DateTime(i64),
    Null,
    Regex(Regex),
    Int32(i32),
    Timestamp(Timestamp),
    Int64(i64),
    Decimal128(Decimal128),
    /// Undecoded nested document sharing storage with its parent
    RawDocument(RawDocument),
    /// Undecoded nested array sharing storage with its parent
    RawArray(RawArray),
}

impl Value {
    /// The wire tag byte for this value
    pub(crate) fn tag(&self) -> u8 {
        match self {
            Value::Double(_) => TAG_DOUBLE,
            Value::String(_) => TAG_STRING,
            Value::Document(_) | Value::RawDocument(_) => TAG_DOCUMENT,
            Value::Array(_) | Value::RawArray(_) => TAG_ARRAY,
            Value::Binary(_) => TAG_BINARY,
            Value::ObjectId(_) => TAG_OBJECT_ID,
            Value::Bool(_) => TAG_BOOL,
            Value::DateTime(_) => TAG_DATE_TIME,
            Value::Null => TAG_NULL,
            Value::Regex(_) => TAG_REGEX,
            Value::Int32(_) => TAG_INT32,
            Value::Timestamp(_) => TAG_TIMESTAMP,
            Value::Int64(_) => TAG_INT64,
            Value::Decimal128(_) => TAG_DECIMAL128,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&Binary> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Converts a `DateTime` value to a chrono instant, millisecond precision
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::DateTime(ms) => DateTime::from_timestamp_millis(*ms),
            _ => None,
        }
    }
}

// Doubles are compared bitwise so that NaN payloads and -0.0 behave the same
// way in comparisons as they do on the wire.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Document(a), Value::Document(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::ObjectId(a), Value::ObjectId(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Regex(a), Value::Regex(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Decimal128(a), Value::Decimal128(b)) => a == b,
            (Value::RawDocument(a), Value::RawDocument(b)) => a == b,
            (Value::RawArray(a), Value::RawArray(b)) => a == b,
            _ => false,
        }
    }
}

/// Binary subtypes recognised by the codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinarySubtype {
    /// 0x00
    Generic,
    /// 0x01
    Function,
    /// 0x02
    GenericOld,
    /// 0x03
    UuidOld,
    /// 0x04
    Uuid,
    /// 0x80
    User,
}

impl BinarySubtype {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(BinarySubtype::Generic),
            0x01 => Some(BinarySubtype::Function),
            0x02 => Some(BinarySubtype::GenericOld),
            0x03 => Some(BinarySubtype::UuidOld),
            0x04 => Some(BinarySubtype::Uuid),
            0x80 => Some(BinarySubtype::User),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            BinarySubtype::Generic => 0x00,
            BinarySubtype::Function => 0x01,
            BinarySubtype::GenericOld => 0x02,
            BinarySubtype::UuidOld => 0x03,
            BinarySubtype::Uuid => 0x04,
            BinarySubtype::User => 0x80,
        }
    }
}

/// Binary value: subtype byte plus opaque bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binary {
    pub subtype: BinarySubtype,
    pub bytes: Vec<u8>,
}

impl Binary {
    /// Generic (0x00) binary with the given bytes
    pub fn generic(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            subtype: BinarySubtype::Generic,
            bytes: bytes.into(),
        }
    }

    /// UUID (0x04) binary with the given bytes
    pub fn uuid(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            subtype: BinarySubtype::Uuid,
            bytes: bytes.into(),
        }
    }
}

/// 12 opaque bytes identifying a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub [u8; 12]);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Regular expression: pattern and options, both without embedded NUL bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Regex {
    pub pattern: String,
    pub options: String,
}

/// Internal MongoDB timestamp: seconds in the high 32 bits, an ordinal in the low 32
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn new(t: u32, i: u32) -> Self {
        Self(u64::from(t) << 32 | u64::from(i))
    }

    /// The time component (high 32 bits)
    pub fn t(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// The increment component (low 32 bits)
    pub fn i(self) -> u32 {
        self.0 as u32
    }
}

/// Opaque 128-bit decimal; the codec does not interpret it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal128 {
    pub l: u64,
    pub h: u64,
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<Document> for Value {
    fn from(v: Document) -> Self {
        Value::Document(v)
    }
}

impl From<Array> for Value {
    fn from(v: Array) -> Self {
        Value::Array(v)
    }
}

impl From<Binary> for Value {
    fn from(v: Binary) -> Self {
        Value::Binary(v)
    }
}

impl From<ObjectId> for Value {
    fn from(v: ObjectId) -> Self {
        Value::ObjectId(v)
    }
}

impl From<Regex> for Value {
    fn from(v: Regex) -> Self {
        Value::Regex(v)
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Decimal128> for Value {
    fn from(v: Decimal128) -> Self {
        Value::Decimal128(v)
    }
}

impl From<RawDocument> for Value {
    fn from(v: RawDocument) -> Self {
        Value::RawDocument(v)
    }
}

impl From<RawArray> for Value {
    fn from(v: RawArray) -> Self {
        Value::RawArray(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v.timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_equality_is_bitwise() {
        let nan1 = Value::Double(f64::from_bits(0x7ff8_0000_0000_0001));
        let nan2 = Value::Double(f64::from_bits(0x7ff8_0000_0000_0001));
        let nan3 = Value::Double(f64::from_bits(0x7ff8_0000_0000_0002));
        assert_eq!(nan1, nan2);
        assert_ne!(nan1, nan3);

        assert_ne!(Value::Double(0.0), Value::Double(-0.0));
        assert_eq!(Value::Double(-0.0), Value::Double(-0.0));
    }

    #[test]
    fn test_timestamp_components() {
        let ts = Timestamp::new(100, 500);
        assert_eq!(ts.t(), 100);
        assert_eq!(ts.i(), 500);
        assert_eq!(ts.0, (100u64 << 32) | 500);
    }

    #[test]
    fn test_object_id_display() {
        let id = ObjectId([
            0x63, 0x77, 0xf2, 0x13, 0x75, 0x7c, 0x0b, 0xab, 0xde, 0xbc, 0x2f, 0x6a,
        ]);
        assert_eq!(id.to_string(), "6377f213757c0babdebc2f6a");
    }

    #[test]
    fn test_binary_subtype_roundtrip() {
        for b in [0x00, 0x01, 0x02, 0x03, 0x04, 0x80] {
            assert_eq!(BinarySubtype::from_u8(b).unwrap().as_u8(), b);
        }
        assert_eq!(BinarySubtype::from_u8(0x05), None);
        assert_eq!(BinarySubtype::from_u8(0x81), None);
    }

    #[test]
    fn test_datetime_conversion() {
        let dt = chrono::DateTime::from_timestamp_millis(1_627_131_281_571).unwrap();
        let v = Value::from(dt);
        assert_eq!(v, Value::DateTime(1_627_131_281_571));
        assert_eq!(v.as_datetime(), Some(dt));
    }
}
