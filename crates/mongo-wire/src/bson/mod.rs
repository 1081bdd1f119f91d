//! BSON subset: value model, documents, and the binary codec
//!
//! Decoding is offered in two depths. A shallow decode materialises only the
//! top-level fields and keeps nested documents and arrays as zero-copy
//! subslices of the input; a deep decode materialises the whole tree.
//! Encoding a decoded document reproduces the source bytes bit-exactly,
//! including NaN payloads and negative zero.

mod decode;
mod document;
mod encode;
mod raw;
mod value;

pub use document::{Array, Document};
pub use raw::{find_raw, RawArray, RawDocument};
pub use value::{Binary, BinarySubtype, Decimal128, ObjectId, Regex, Timestamp, Value};

pub(crate) use decode::decode_cstring;
