//! Streaming RESP Decoder
//!
//! This module turns a byte stream into an ordered sequence of [`Payload`]s,
//! one per complete protocol message or per error.
//!
//! ## How the Decoder Works
//!
//! The decoder reads one *unit* at a time from a buffered reader:
//!
//! - In line mode it reads through the next `\n` and requires the line to
//!   end with CRLF.
//! - After a `$<len>` header it reads exactly `len + 2` bytes as an opaque,
//!   binary-safe body. No line scanning happens inside the body.
//!
//! Each unit is fed into a small state machine ([`ReadState`]). Headers
//! (`*N`, `$L`) open a multi-line message; body units are collected until the
//! expected number of arguments is reached, then the message is emitted.
//!
//! ```text
//!   *2\r\n        -> multi_line, expect 2 args
//!   $3\r\n        -> bulk_len = 3
//!   foo\r\n       -> args = [foo]
//!   $-1\r\n       -> args = [foo, ""]   (finished, emit Array)
//! ```
//!
//! ## Errors
//!
//! - A malformed unit is a **protocol error**: it is emitted as a payload, the
//!   state is reset, and decoding continues with the next unit.
//! - An I/O failure (short read, peer close, reset) is a **transport error**:
//!   it is emitted once and the sequence ends for good.

use crate::protocol::types::{prefix, Reply, CRLF};
use bytes::Bytes;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, trace};

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: i64 = 512 * 1024 * 1024;

/// Maximum number of elements in one array (same as Redis)
pub const MAX_ARRAY_LEN: u32 = 1024 * 1024;

/// Upper bound on the argument buffer reserved up front for an array.
const ARGS_PREALLOC: usize = 64;

/// The outcome of one decode attempt.
pub type Payload = Result<Reply, DecodeError>;

/// Errors surfaced by the decoder.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Malformed input. Carries the offending raw unit, CRLF included.
    #[error("protocol error: '{}'", printable(.unit))]
    Protocol { unit: Bytes },

    /// The underlying stream failed or was closed.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

impl DecodeError {
    fn protocol(unit: impl Into<Bytes>) -> Self {
        DecodeError::Protocol { unit: unit.into() }
    }

    /// Returns true if this error ends the payload sequence.
    pub fn is_transport(&self) -> bool {
        matches!(self, DecodeError::Transport(_))
    }

    /// Returns true if the peer closed the connection in an orderly way.
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, DecodeError::Transport(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }

    /// The offending unit as single-line text, suitable for an error reply.
    pub fn unit_text(&self) -> Option<String> {
        match self {
            DecodeError::Protocol { unit } => Some(printable(unit)),
            DecodeError::Transport(_) => None,
        }
    }
}

fn printable(unit: &[u8]) -> String {
    String::from_utf8_lossy(unit)
        .trim_end_matches(['\r', '\n'])
        .replace(['\r', '\n'], " ")
}

/// Transient state for the message currently being assembled.
#[derive(Debug, Default)]
pub(crate) struct ReadState {
    /// Currently assembling an array or bulk body
    multi_line: bool,
    /// `*` or `$`, the header that opened the message
    msg_type: u8,
    expected_args: usize,
    args: Vec<Bytes>,
    /// Length of the pending body, or -1 after a top-level null bulk
    bulk_len: i64,
    /// The next unit is a body of exactly `bulk_len + 2` bytes
    expect_body: bool,
}

impl ReadState {
    pub(crate) fn finished(&self) -> bool {
        self.expected_args > 0 && self.args.len() == self.expected_args
    }

    /// Parses an array header: `*<count>\r\n`
    fn parse_array_header(&mut self, unit: &[u8]) -> Result<(), DecodeError> {
        let count: u32 = parse_number(&unit[1..unit.len() - 2])
            .filter(|count| *count <= MAX_ARRAY_LEN)
            .ok_or_else(|| DecodeError::protocol(Bytes::copy_from_slice(unit)))?;

        if count > 0 {
            self.msg_type = prefix::ARRAY;
            self.multi_line = true;
            self.expected_args = count as usize;
            self.args = Vec::with_capacity(self.expected_args.min(ARGS_PREALLOC));
        }
        Ok(())
    }

    /// Parses a top-level bulk header: `$<len>\r\n`
    fn parse_bulk_header(&mut self, unit: &[u8]) -> Result<(), DecodeError> {
        let len: i64 = parse_number(&unit[1..unit.len() - 2])
            .ok_or_else(|| DecodeError::protocol(Bytes::copy_from_slice(unit)))?;

        match len {
            -1 => {
                self.bulk_len = -1;
                Ok(())
            }
            1..=MAX_BULK_SIZE => {
                self.msg_type = prefix::BULK_STRING;
                self.multi_line = true;
                self.expected_args = 1;
                self.args = Vec::with_capacity(1);
                self.bulk_len = len;
                self.expect_body = true;
                Ok(())
            }
            _ => Err(DecodeError::protocol(Bytes::copy_from_slice(unit))),
        }
    }

    /// Feeds one unit of an array or bulk body into the state.
    fn read_body(&mut self, unit: Unit) -> Result<(), DecodeError> {
        match unit {
            Unit::Body(body) => {
                self.args.push(strip_crlf(body));
            }
            Unit::Line(line) if line.first() == Some(&prefix::BULK_STRING) => {
                let len: i64 = parse_number(&line[1..line.len() - 2])
                    .filter(|len| *len <= MAX_BULK_SIZE)
                    .ok_or_else(|| DecodeError::protocol(line.clone()))?;

                if len < 0 {
                    // Null bulk inside an array, no body follows
                    self.args.push(Bytes::new());
                } else {
                    // `$0` still carries a bare CRLF body
                    self.bulk_len = len;
                    self.expect_body = true;
                }
            }
            Unit::Line(line) => {
                self.args.push(strip_crlf(line));
            }
        }
        Ok(())
    }

    /// Builds the reply for a finished message.
    fn into_reply(self) -> Reply {
        if self.msg_type == prefix::ARRAY {
            Reply::Array(self.args.into_iter().map(Some).collect())
        } else {
            Reply::Bulk(self.args.into_iter().next().unwrap_or_default())
        }
    }
}

/// One unit read from the stream.
#[derive(Debug)]
enum Unit {
    /// A CRLF-terminated line
    Line(Bytes),
    /// A fixed-length body, CRLF included
    Body(Bytes),
}

fn strip_crlf(mut unit: Bytes) -> Bytes {
    unit.truncate(unit.len().saturating_sub(2));
    unit
}

fn parse_number<T: std::str::FromStr>(digits: &[u8]) -> Option<T> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Parses a line that carries a whole reply: `+`, `-` or `:`.
fn parse_single_line(line: &[u8]) -> Payload {
    let content = line.get(1..line.len() - 2).unwrap_or_default();
    match line[0] {
        prefix::STATUS => Ok(Reply::Status(String::from_utf8_lossy(content).into_owned())),
        prefix::ERROR => Ok(Reply::Error(String::from_utf8_lossy(content).into_owned())),
        prefix::INTEGER => parse_number(content)
            .map(Reply::Integer)
            .ok_or_else(|| DecodeError::protocol(Bytes::copy_from_slice(line))),
        _ => Err(DecodeError::protocol(Bytes::copy_from_slice(line))),
    }
}

/// A pull-style RESP decoder over any async byte stream.
///
/// # Example
///
/// ```
/// use flashgate::protocol::{Decoder, Reply};
///
/// # tokio_test::block_on(async {
/// let mut decoder = Decoder::new(&b"*1\r\n$4\r\nPING\r\n"[..]);
/// let reply = decoder.next().await.unwrap().unwrap();
/// assert_eq!(reply, Reply::array(["PING"]));
/// # });
/// ```
#[derive(Debug)]
pub struct Decoder<R> {
    reader: BufReader<R>,
    state: ReadState,
    /// Set once a transport error has been emitted
    done: bool,
}

impl<R: AsyncRead + Unpin> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            state: ReadState::default(),
            done: false,
        }
    }

    /// Decodes the next payload.
    ///
    /// Returns `None` only after a transport error has been returned.
    pub async fn next(&mut self) -> Option<Payload> {
        if self.done {
            return None;
        }

        loop {
            let unit = match self.read_unit().await {
                Ok(unit) => unit,
                Err(e) => {
                    self.state = ReadState::default();
                    self.done = e.is_transport();
                    return Some(Err(e));
                }
            };

            if let Some(payload) = self.decode_unit(unit) {
                self.state = ReadState::default();
                return Some(payload);
            }
        }
    }

    /// Reads the next line or fixed-length body, depending on the state.
    async fn read_unit(&mut self) -> Result<Unit, DecodeError> {
        if self.state.expect_body {
            let mut body = vec![0u8; self.state.bulk_len as usize + 2];
            self.reader.read_exact(&mut body).await?;
            self.state.bulk_len = 0;
            self.state.expect_body = false;

            if !body.ends_with(CRLF) {
                return Err(DecodeError::protocol(body));
            }
            trace!(len = body.len(), "Read bulk body");
            return Ok(Unit::Body(Bytes::from(body)));
        }

        let mut line = Vec::new();
        self.reader.read_until(b'\n', &mut line).await?;

        if line.last() != Some(&b'\n') {
            return Err(DecodeError::Transport(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed",
            )));
        }
        if !line.ends_with(CRLF) {
            return Err(DecodeError::protocol(line));
        }
        trace!(len = line.len(), "Read line");
        Ok(Unit::Line(Bytes::from(line)))
    }

    /// Advances the state machine by one unit, returning a payload when a
    /// message is complete or malformed.
    fn decode_unit(&mut self, unit: Unit) -> Option<Payload> {
        if self.state.multi_line {
            if let Err(e) = self.state.read_body(unit) {
                return Some(Err(e));
            }
            if self.state.finished() {
                let state = std::mem::take(&mut self.state);
                return Some(Ok(state.into_reply()));
            }
            return None;
        }

        let line = match unit {
            Unit::Line(line) => line,
            Unit::Body(body) => return Some(Err(DecodeError::protocol(body))),
        };

        match line[0] {
            prefix::ARRAY => match self.state.parse_array_header(&line) {
                Err(e) => Some(Err(e)),
                Ok(()) if self.state.expected_args == 0 => Some(Ok(Reply::EmptyArray)),
                Ok(()) => None,
            },
            prefix::BULK_STRING => match self.state.parse_bulk_header(&line) {
                Err(e) => Some(Err(e)),
                Ok(()) if self.state.bulk_len == -1 => Some(Ok(Reply::NullBulk)),
                Ok(()) => None,
            },
            _ => Some(parse_single_line(&line)),
        }
    }
}

/// Decodes `reader` on its own task and hands payloads over one at a time.
///
/// The decode task only runs ahead of the consumer by a single payload. If
/// the task panics, the panic is logged and the stream simply ends.
pub fn parse_stream<R>(reader: R) -> PayloadStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);

    let task = tokio::spawn(async move {
        let mut decoder = Decoder::new(reader);
        while let Some(payload) = decoder.next().await {
            if tx.send(payload).await.is_err() {
                // Consumer went away
                break;
            }
        }
    });

    PayloadStream {
        rx,
        task: Some(task),
    }
}

/// Receiving side of [`parse_stream`].
///
/// Dropping the stream stops the decode task.
#[derive(Debug)]
pub struct PayloadStream {
    rx: mpsc::Receiver<Payload>,
    task: Option<JoinHandle<()>>,
}

impl PayloadStream {
    /// Waits for the next payload. `None` means the sequence has ended.
    pub async fn next(&mut self) -> Option<Payload> {
        if let Some(payload) = self.rx.recv().await {
            return Some(payload);
        }

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log_decoder_fault(e);
            }
        }
        None
    }

    /// Stops the decode task and waits until it has released the reader.
    pub async fn close(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await {
                log_decoder_fault(e);
            }
        }
    }
}

impl Drop for PayloadStream {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

fn log_decoder_fault(e: JoinError) {
    if !e.is_panic() {
        return;
    }

    let panic = e.into_panic();
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());

    error!(panic = %message, "Decoder task panicked, ending payload stream");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    async fn decode_all(input: &[u8]) -> Vec<Payload> {
        let mut decoder = Decoder::new(input);
        let mut out = Vec::new();
        while let Some(payload) = decoder.next().await {
            out.push(payload);
        }
        out
    }

    fn unwrap_reply(payload: &Payload) -> &Reply {
        payload.as_ref().expect("expected a reply")
    }

    #[test]
    fn test_finished() {
        let mut state = ReadState::default();
        assert!(!state.finished());

        state.expected_args = 2;
        state.args.push(Bytes::from("a"));
        assert!(!state.finished());

        state.args.push(Bytes::from("b"));
        assert!(state.finished());

        let state = ReadState {
            args: vec![Bytes::from("a")],
            ..ReadState::default()
        };
        assert!(!state.finished());
    }

    #[tokio::test]
    async fn test_empty_array() {
        let mut decoder = Decoder::new(tokio_test::io::Builder::new().read(b"*0\r\n").build());
        let payload = decoder.next().await.unwrap();
        assert_eq!(unwrap_reply(&payload), &Reply::EmptyArray);
    }

    #[tokio::test]
    async fn test_null_bulk() {
        let out = decode_all(b"$-1\r\n").await;
        assert_eq!(out.len(), 2);
        assert_eq!(unwrap_reply(&out[0]), &Reply::NullBulk);
        assert!(out[1].as_ref().unwrap_err().is_peer_closed());
    }

    #[tokio::test]
    async fn test_bulk() {
        let mut decoder = Decoder::new(&b"$3\r\nabc\r\n"[..]);
        let payload = decoder.next().await.unwrap();
        assert_eq!(unwrap_reply(&payload), &Reply::bulk("abc"));
    }

    #[tokio::test]
    async fn test_short_bulk_then_close() {
        let mut decoder = Decoder::new(&b"$3\r\nab"[..]);

        let payload = decoder.next().await.unwrap();
        let err = payload.unwrap_err();
        assert!(err.is_transport());

        assert!(decoder.next().await.is_none());
        assert!(decoder.next().await.is_none());
    }

    #[tokio::test]
    async fn test_array_with_nested_null() {
        let out = decode_all(b"*2\r\n$3\r\nfoo\r\n$-1\r\n").await;
        assert_eq!(
            unwrap_reply(&out[0]),
            &Reply::Array(vec![Some(Bytes::from("foo")), Some(Bytes::new())])
        );
    }

    #[tokio::test]
    async fn test_array_with_zero_length_element() {
        let out = decode_all(b"*2\r\n$0\r\n\r\n$1\r\na\r\n").await;
        assert_eq!(unwrap_reply(&out[0]), &Reply::array(["", "a"]));
        assert!(out[1].as_ref().unwrap_err().is_transport());
    }

    #[tokio::test]
    async fn test_trailing_zero_length_element() {
        let out = decode_all(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$0\r\n\r\n:1\r\n").await;
        assert_eq!(out.len(), 3);
        assert_eq!(unwrap_reply(&out[0]), &Reply::array(["SET", "k", ""]));
        assert_eq!(unwrap_reply(&out[1]), &Reply::integer(1));
        assert!(out[2].as_ref().unwrap_err().is_peer_closed());
    }

    #[tokio::test]
    async fn test_oversized_array_count_is_protocol_error() {
        let out = decode_all(b"*4294967295\r\n*1048577\r\n+OK\r\n").await;
        assert_eq!(out.len(), 4);
        assert!(matches!(out[0], Err(DecodeError::Protocol { .. })));
        assert!(matches!(out[1], Err(DecodeError::Protocol { .. })));
        assert_eq!(unwrap_reply(&out[2]), &Reply::ok());
    }

    #[tokio::test]
    async fn test_max_array_count_then_close() {
        let mut decoder = Decoder::new(&b"*1048576\r\n$1\r\na\r\n"[..]);
        // The peer closes long before the announced count is reached
        assert!(decoder.next().await.unwrap().unwrap_err().is_peer_closed());
    }

    #[tokio::test]
    async fn test_protocol_error_recovers() {
        let out = decode_all(b"*x\r\n+OK\r\n").await;
        assert_eq!(out.len(), 3);

        match &out[0] {
            Err(DecodeError::Protocol { unit }) => assert_eq!(&unit[..], b"*x\r\n"),
            other => panic!("expected protocol error, got {:?}", other),
        }
        assert_eq!(unwrap_reply(&out[1]), &Reply::ok());
        assert!(out[2].as_ref().unwrap_err().is_transport());
    }

    #[tokio::test]
    async fn test_negative_array_count_is_protocol_error() {
        let out = decode_all(b"*-1\r\n:5\r\n").await;
        assert!(matches!(out[0], Err(DecodeError::Protocol { .. })));
        assert_eq!(unwrap_reply(&out[1]), &Reply::integer(5));
    }

    #[tokio::test]
    async fn test_bad_bulk_lengths() {
        for input in [&b"$0\r\n"[..], b"$-2\r\n", b"$abc\r\n"] {
            let out = decode_all(input).await;
            assert!(
                matches!(out[0], Err(DecodeError::Protocol { .. })),
                "input {:?}",
                input
            );
        }
    }

    #[tokio::test]
    async fn test_missing_cr_is_protocol_error() {
        let out = decode_all(b"+OK\n:1\r\n").await;
        assert!(matches!(out[0], Err(DecodeError::Protocol { .. })));
        assert_eq!(unwrap_reply(&out[1]), &Reply::integer(1));
    }

    #[tokio::test]
    async fn test_single_line_replies() {
        let out = decode_all(b"+PONG\r\n-ERR bad\r\n:-42\r\n:nope\r\n").await;
        assert_eq!(unwrap_reply(&out[0]), &Reply::status("PONG"));
        assert_eq!(unwrap_reply(&out[1]), &Reply::error("ERR bad"));
        assert_eq!(unwrap_reply(&out[2]), &Reply::integer(-42));
        assert!(matches!(out[3], Err(DecodeError::Protocol { .. })));
    }

    #[tokio::test]
    async fn test_unknown_prefix_is_protocol_error() {
        let out = decode_all(b"PING\r\n\r\n").await;
        assert!(matches!(out[0], Err(DecodeError::Protocol { .. })));
        assert!(matches!(out[1], Err(DecodeError::Protocol { .. })));
    }

    #[tokio::test]
    async fn test_binary_safe_body() {
        let out = decode_all(b"*1\r\n$6\r\na\r\n\x00$b\r\n").await;
        assert_eq!(
            unwrap_reply(&out[0]),
            &Reply::Array(vec![Some(Bytes::from(&b"a\r\n\x00$b"[..]))])
        );
    }

    #[tokio::test]
    async fn test_body_without_crlf_is_protocol_error() {
        let out = decode_all(b"$3\r\nabcXY+OK\r\n").await;
        assert!(matches!(out[0], Err(DecodeError::Protocol { .. })));
        assert_eq!(unwrap_reply(&out[1]), &Reply::ok());
    }

    #[tokio::test]
    async fn test_split_reads() {
        let mock = tokio_test::io::Builder::new()
            .read(b"*2\r\n$3\r")
            .read(b"\nSET\r\n$2")
            .read(b"\r\nhi\r\n")
            .build();
        let mut decoder = Decoder::new(mock);

        let payload = decoder.next().await.unwrap();
        assert_eq!(unwrap_reply(&payload), &Reply::array(["SET", "hi"]));
    }

    #[tokio::test]
    async fn test_read_error_ends_sequence() {
        let mock = tokio_test::io::Builder::new()
            .read(b"*1\r\n")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let mut decoder = Decoder::new(mock);

        let err = decoder.next().await.unwrap().unwrap_err();
        assert!(err.is_transport());
        assert!(!err.is_peer_closed());
        assert!(decoder.next().await.is_none());
    }

    #[tokio::test]
    async fn test_roundtrip() {
        let replies = vec![
            Reply::status("OK"),
            Reply::error("ERR unknown command 'FOO'"),
            Reply::integer(i64::MIN),
            Reply::bulk(Bytes::from(&b"bin\r\n\x00ary"[..])),
            Reply::NullBulk,
            Reply::array(["SET", "key", "value"]),
            Reply::EmptyArray,
        ];

        let mut wire = Vec::new();
        for reply in &replies {
            reply.serialize_into(&mut wire);
        }

        let decoded = decode_all(&wire).await;
        for (reply, payload) in replies.iter().zip(&decoded) {
            assert_eq!(unwrap_reply(payload), reply);
        }
        assert_eq!(decoded.len(), replies.len() + 1);
    }

    #[tokio::test]
    async fn test_parse_stream() {
        let mut stream = parse_stream(&b"*1\r\n$4\r\nPING\r\n*x\r\n"[..]);

        let first = stream.next().await.unwrap();
        assert_eq!(unwrap_reply(&first), &Reply::array(["PING"]));
        assert!(matches!(
            stream.next().await,
            Some(Err(DecodeError::Protocol { .. }))
        ));
        assert!(stream.next().await.unwrap().unwrap_err().is_transport());
        assert!(stream.next().await.is_none());
    }

    struct PanickingReader;

    impl AsyncRead for PanickingReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            panic!("reader blew up");
        }
    }

    /// Never yields data; holds a token so tests can see when it is dropped.
    struct IdleReader(Arc<()>);

    impl AsyncRead for IdleReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    #[tokio::test]
    async fn test_close_releases_reader() {
        let token = Arc::new(());
        let stream = parse_stream(IdleReader(Arc::clone(&token)));
        tokio::task::yield_now().await;

        stream.close().await;
        assert_eq!(Arc::strong_count(&token), 1);
    }

    #[tokio::test]
    async fn test_decoder_panic_ends_stream() {
        let mut stream = parse_stream(PanickingReader);
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }
}
