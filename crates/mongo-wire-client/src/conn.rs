//! A single client connection
//!
//! [`Conn`] wraps a buffered TCP or TLS stream and speaks framed wire
//! messages over it. It is not safe for concurrent use: exactly one task
//! drives the connection, with at most one request in flight.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI32, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncReadExt, AsyncWriteExt, BufStream, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use mongo_wire::{
    doc, MsgBody, MsgHeader, OpCode, OpMsg, Value, WireError, HEADER_LEN, MAX_MESSAGE_LEN,
};

use crate::error::{ClientError, Result};

/// The last generated request ID, shared by all connections in the process
static NEXT_REQUEST_ID: AtomicI32 = AtomicI32::new(0);

/// The underlying byte stream, plain or TLS
#[derive(Debug)]
enum Stream {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Stream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Stream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_flush(cx),
            Stream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Stream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// A single client connection.
///
/// Not safe for concurrent use. A timed-out read or write leaves the stream
/// position undefined; the connection must be closed.
#[derive(Debug)]
pub struct Conn {
    stream: BufStream<Stream>,
    timeout: Option<Duration>,
}

impl Conn {
    /// Wraps an established TCP connection
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream: BufStream::new(Stream::Tcp(stream)),
            timeout: None,
        }
    }

    pub(crate) fn from_tls(stream: TlsStream<TcpStream>) -> Self {
        Self {
            stream: BufStream::new(Stream::Tls(Box::new(stream))),
            timeout: None,
        }
    }

    /// Sets the per-operation deadline applied to each subsequent read and
    /// write individually
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Shuts the stream down
    pub async fn close(mut self) -> Result<()> {
        debug!("closing");
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Reads the next message from the connection
    pub async fn read(&mut self) -> Result<(MsgHeader, MsgBody)> {
        let timeout = self.timeout;
        let (header, body_bytes) = with_timeout(timeout, read_frame(&mut self.stream)).await??;

        // checksum first: corrupted contents must not surface as framing
        // errors
        if header.op_code == OpCode::Msg {
            OpMsg::verify_checksum(&header, &body_bytes)?;
        }
        let body = MsgBody::decode(header.op_code, body_bytes)?;

        debug!(
            length = header.message_length,
            id = header.request_id,
            response_to = header.response_to,
            opcode = %header.op_code,
            command = body.command().as_deref().unwrap_or(""),
            "<<<",
        );

        Ok((header, body))
    }

    /// Writes one message and flushes it.
    ///
    /// The header's `message_length` is computed from the encoded body.
    pub async fn write(&mut self, header: &MsgHeader, body: &MsgBody) -> Result<()> {
        let encoded = body.encode()?;

        let message_length = encoded
            .len()
            .checked_add(HEADER_LEN)
            .and_then(|l| i32::try_from(l).ok())
            .ok_or(WireError::DocumentTooLong(encoded.len()))?;
        let header = MsgHeader {
            message_length,
            ..*header
        };

        debug!(
            length = header.message_length,
            id = header.request_id,
            response_to = header.response_to,
            opcode = %header.op_code,
            command = body.command().as_deref().unwrap_or(""),
            ">>>",
        );

        let timeout = self.timeout;
        with_timeout(timeout, async {
            self.stream.write_all(&header.encode()).await?;
            self.stream.write_all(&encoded).await?;
            self.stream.flush().await
        })
        .await
    }

    /// Writes pre-encoded frame bytes as-is and flushes them
    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        debug!(length = bytes.len(), ">>> raw bytes");

        let timeout = self.timeout;
        with_timeout(timeout, async {
            self.stream.write_all(bytes).await?;
            self.stream.flush().await
        })
        .await
    }

    /// Sends a request and reads its reply.
    ///
    /// A fresh request ID is assigned; the reply's `response_to` must match
    /// it, otherwise [`ClientError::ResponseMismatch`] carries the received
    /// message back to the caller.
    pub async fn request(&mut self, body: &MsgBody) -> Result<(MsgHeader, MsgBody)> {
        let request_id = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed).wrapping_add(1);

        let header = MsgHeader {
            message_length: 0, // filled in by write
            request_id,
            response_to: 0,
            op_code: body.op_code(),
        };

        self.write(&header, body).await?;
        let (res_header, res_body) = self.read().await?;

        if res_header.response_to != request_id {
            return Err(ClientError::ResponseMismatch {
                expected: request_id,
                actual: res_header.response_to,
                header: res_header,
                body: Box::new(res_body),
            });
        }

        Ok((res_header, res_body))
    }

    /// Sends a ping command and checks the server's answer
    pub async fn ping(&mut self) -> Result<()> {
        let cmd = doc! { "ping" => 1_i32, "$db" => "test" };

        let (_, body) = self.request(&MsgBody::Msg(OpMsg::new(&cmd)?)).await?;
        let res = expect_op_msg(body)?.document_deep()?;

        if !command_ok(&res) {
            return Err(ClientError::Server(format!(
                "ping failed (ok was {:?})",
                res.get("ok")
            )));
        }

        Ok(())
    }
}

/// Reads one frame: the 16-byte header, then the announced body
async fn read_frame(
    stream: &mut BufStream<Stream>,
) -> std::io::Result<std::result::Result<(MsgHeader, Bytes), WireError>> {
    let mut header_buf = [0u8; HEADER_LEN];
    stream.read_exact(&mut header_buf).await?;

    let header = match MsgHeader::decode(&header_buf) {
        Ok(header) => header,
        Err(e) => return Ok(Err(e)),
    };

    if header.message_length > MAX_MESSAGE_LEN {
        // the remainder of the stream is unusable; the caller must close
        return Ok(Err(WireError::MessageTooLarge(header.message_length)));
    }
    // signed comparison so a negative length cannot reach the allocation
    if header.message_length < HEADER_LEN as i32 + 4 {
        return Ok(Err(WireError::InvalidInput(format!(
            "message length {}",
            header.message_length
        ))));
    }

    let mut body = vec![0u8; header.message_length as usize - HEADER_LEN];
    stream.read_exact(&mut body).await?;

    Ok(Ok((header, Bytes::from(body))))
}

/// Applies the connection's per-operation deadline to an I/O future
async fn with_timeout<T, F>(timeout: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    let result = match timeout {
        Some(d) => tokio::time::timeout(d, fut)
            .await
            .map_err(|_| ClientError::Timeout(d))?,
        None => fut.await,
    };
    Ok(result?)
}

/// Narrows a reply body to OP_MSG
pub(crate) fn expect_op_msg(body: MsgBody) -> Result<OpMsg> {
    match body {
        MsgBody::Msg(msg) => Ok(msg),
        other => Err(ClientError::Protocol(format!(
            "unexpected {} reply",
            other.op_code()
        ))),
    }
}

/// Servers report success as a double `ok` equal to 1.0
pub(crate) fn command_ok(doc: &mongo_wire::Document) -> bool {
    matches!(doc.get("ok"), Some(Value::Double(ok)) if *ok == 1.0)
}
