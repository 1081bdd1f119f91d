//! MongoDB wire protocol client
//!
//! A minimal single-connection client on top of the `mongo-wire` codec:
//! URI handling, TCP/TLS transport, request/response correlation, and
//! SCRAM-SHA-256 / PLAIN authentication. There is no pooling and no retry;
//! a connection serves one task and one request at a time.

mod auth;
mod conn;
mod connect;
pub mod error;
pub mod scram;

pub use conn::Conn;
pub use connect::{connect, connect_ping, credentials, Credentials};
pub use error::{ClientError, Result};
pub use scram::ScramClient;
