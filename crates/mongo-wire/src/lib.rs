//! MongoDB wire protocol codec
//!
//! This crate implements the framed messages exchanged between
//! MongoDB-compatible clients and servers: the BSON subset used for command
//! documents, and the OP_MSG / OP_REPLY envelopes that carry them. It is
//! pure and synchronous; transports live elsewhere.

pub mod bson;
pub mod error;
pub mod wire;

pub use bson::{
    find_raw, Array, Binary, BinarySubtype, Decimal128, Document, ObjectId, RawArray,
    RawDocument, Regex, Timestamp, Value,
};
pub use error::{Result, WireError};
pub use wire::{
    MsgBody, MsgFlags, MsgHeader, MsgSection, OpCode, OpMsg, OpQuery, OpReply, ReplyFlags,
    HEADER_LEN, MAX_MESSAGE_LEN,
};
