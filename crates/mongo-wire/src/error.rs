//! Codec error types

use thiserror::Error;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, WireError>;

/// Errors produced while encoding or decoding BSON documents and wire messages
#[derive(Error, Debug, PartialEq, Eq)]
pub enum WireError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("invalid element tag: 0x{0:02x}")]
    InvalidTag(u8),

    #[error("invalid binary subtype: 0x{0:02x}")]
    InvalidBinarySubtype(u8),

    #[error("duplicate field name: {0:?}")]
    DuplicateField(String),

    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    #[error("field name contains a NUL byte: {0:?}")]
    NulInName(String),

    #[error("string length overflows int32: {0} bytes")]
    StringTooLong(usize),

    #[error("document length overflows int32: {0} bytes")]
    DocumentTooLong(usize),

    #[error("unknown opcode: {0}")]
    UnknownOpCode(i32),

    #[error("unsupported flag bits: 0x{0:08x}")]
    UnsupportedFlags(u32),

    #[error("message length {0} exceeds the {max} byte limit", max = crate::wire::MAX_MESSAGE_LEN)]
    MessageTooLarge(i32),

    #[error("checksum mismatch: message carries 0x{expected:08x}, contents give 0x{actual:08x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("message must contain exactly one body section, got {0}")]
    BodySectionCount(usize),
}
