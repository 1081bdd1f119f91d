//! Message header

use std::fmt;

use crate::error::{Result, WireError};

/// Size of the fixed message header in bytes
pub const HEADER_LEN: usize = 16;

/// Wire opcodes this codec understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    /// OP_REPLY: legacy server reply, used by the initial handshake
    Reply,
    /// OP_QUERY: legacy request, constructed for the handshake only
    Query,
    /// OP_MSG: the current envelope
    Msg,
}

impl OpCode {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(OpCode::Reply),
            2004 => Some(OpCode::Query),
            2013 => Some(OpCode::Msg),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            OpCode::Reply => 1,
            OpCode::Query => 2004,
            OpCode::Msg => 2013,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpCode::Reply => "OP_REPLY",
            OpCode::Query => "OP_QUERY",
            OpCode::Msg => "OP_MSG",
        };
        f.write_str(s)
    }
}

/// The 16-byte little-endian header that precedes every message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHeader {
    /// Total message length, header included
    pub message_length: i32,
    pub request_id: i32,
    pub response_to: i32,
    pub op_code: OpCode,
}

impl MsgHeader {
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(WireError::UnexpectedEof);
        }

        let message_length = i32::from_le_bytes(buf[0..4].try_into().unwrap());
        let request_id = i32::from_le_bytes(buf[4..8].try_into().unwrap());
        let response_to = i32::from_le_bytes(buf[8..12].try_into().unwrap());
        let op_code = i32::from_le_bytes(buf[12..16].try_into().unwrap());
        let op_code = OpCode::from_i32(op_code).ok_or(WireError::UnknownOpCode(op_code))?;

        Ok(Self {
            message_length,
            request_id,
            response_to,
            op_code,
        })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&self.message_length.to_le_bytes());
        buf[4..8].copy_from_slice(&self.request_id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.response_to.to_le_bytes());
        buf[12..16].copy_from_slice(&self.op_code.as_i32().to_le_bytes());
        buf
    }
}
