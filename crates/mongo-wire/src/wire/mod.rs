//! Wire framing: headers, OP_MSG, OP_REPLY, and the legacy OP_QUERY

mod header;
mod op_msg;
mod op_query;
mod op_reply;

pub use header::{MsgHeader, OpCode, HEADER_LEN};
pub use op_msg::{MsgFlags, MsgSection, OpMsg};
pub use op_query::OpQuery;
pub use op_reply::{OpReply, ReplyFlags};

use bytes::Bytes;

use crate::error::{Result, WireError};

/// Maximum accepted message length, matching the server default.
/// Transports must check the announced length against this bound before
/// allocating a body buffer.
pub const MAX_MESSAGE_LEN: i32 = 48_000_000;

/// A message body of any supported opcode
#[derive(Debug, Clone, PartialEq)]
pub enum MsgBody {
    Msg(OpMsg),
    Reply(OpReply),
    Query(OpQuery),
}

impl MsgBody {
    pub fn op_code(&self) -> OpCode {
        match self {
            MsgBody::Msg(_) => OpCode::Msg,
            MsgBody::Reply(_) => OpCode::Reply,
            MsgBody::Query(_) => OpCode::Query,
        }
    }

    /// Decodes a body according to the header's opcode
    pub fn decode(op_code: OpCode, body: Bytes) -> Result<Self> {
        match op_code {
            OpCode::Msg => Ok(MsgBody::Msg(OpMsg::decode(body)?)),
            OpCode::Reply => Ok(MsgBody::Reply(OpReply::decode(body)?)),
            OpCode::Query => Err(WireError::InvalidInput(
                "OP_QUERY decoding is not supported".to_owned(),
            )),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            MsgBody::Msg(msg) => msg.encode(),
            MsgBody::Reply(reply) => reply.encode(),
            MsgBody::Query(query) => query.encode(),
        }
    }

    /// The command name for OP_MSG bodies, for diagnostics
    pub fn command(&self) -> Option<String> {
        match self {
            MsgBody::Msg(msg) => msg.command().ok(),
            _ => None,
        }
    }
}
