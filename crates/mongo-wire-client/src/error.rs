//! Client error types

use std::time::Duration;

use mongo_wire::{MsgBody, MsgHeader, WireError};
use thiserror::Error;

use crate::scram::ScramError;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors produced by the connection layer
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] WireError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(String),

    /// The reply does not correlate with the request. The received message
    /// is carried along for inspection.
    #[error("response's response_to={actual} is not equal to request's request_id={expected}")]
    ResponseMismatch {
        expected: i32,
        actual: i32,
        header: MsgHeader,
        body: Box<MsgBody>,
    },

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("SCRAM error: {0}")]
    Scram(#[from] ScramError),

    #[error("server error: {0}")]
    Server(String),
}
