//! RESP (Redis Serialization Protocol) Reply Types
//!
//! This module defines the closed set of values that can travel over the wire
//! and their serialization back to bytes.
//!
//! ## Protocol Format
//!
//! Each RESP type starts with a type prefix byte:
//! - `+` Status
//! - `-` Error
//! - `:` Integer
//! - `$` Bulk String
//! - `*` Array (of bulk strings)
//!
//! All lines are terminated with CRLF (`\r\n`).
//!
//! ## Examples
//!
//! Status: `+OK\r\n`
//! Error: `-ERR unknown command\r\n`
//! Integer: `:1000\r\n`
//! Bulk String: `$5\r\nhello\r\n`
//! Null Bulk String: `$-1\r\n`
//! Array: `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`
//! Empty Array: `*0\r\n`

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const STATUS: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A value in the RESP protocol.
///
/// Requests arrive as [`Reply::Array`] values of bulk strings, and responses
/// are built from any variant. Values are immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Format: `+<text>\r\n`
    Status(String),

    /// Format: `-<message>\r\n`
    Error(String),

    /// 64-bit signed integer.
    /// Format: `:<integer>\r\n`
    Integer(i64),

    /// Binary-safe bulk string.
    /// Format: `$<length>\r\n<data>\r\n`
    Bulk(Bytes),

    /// Format: `$-1\r\n`
    NullBulk,

    /// An ordered sequence of bulk strings. `None` elements encode as
    /// null bulk strings.
    /// Format: `*<count>\r\n<bulk1><bulk2>...`
    Array(Vec<Option<Bytes>>),

    /// Format: `*0\r\n`
    EmptyArray,
}

impl Reply {
    /// Creates a new status reply.
    ///
    /// # Example
    /// ```
    /// use flashgate::protocol::types::Reply;
    /// let ok = Reply::status("OK");
    /// ```
    pub fn status(s: impl Into<String>) -> Self {
        Reply::Status(s.into())
    }

    /// Creates a new error reply.
    ///
    /// # Example
    /// ```
    /// use flashgate::protocol::types::Reply;
    /// let err = Reply::error("ERR unknown command");
    /// ```
    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    /// Creates a new bulk string reply.
    ///
    /// # Example
    /// ```
    /// use flashgate::protocol::types::Reply;
    /// use bytes::Bytes;
    /// let bulk = Reply::bulk(Bytes::from("hello"));
    /// ```
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(data.into())
    }

    pub fn null_bulk() -> Self {
        Reply::NullBulk
    }

    /// Creates an array reply from a list of arguments.
    ///
    /// An empty list becomes [`Reply::EmptyArray`], so there is exactly one
    /// representation of the empty array.
    pub fn array<I, B>(args: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let args: Vec<Option<Bytes>> = args.into_iter().map(|b| Some(b.into())).collect();
        if args.is_empty() {
            Reply::EmptyArray
        } else {
            Reply::Array(args)
        }
    }

    /// Common reply for successful operations
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    /// Serializes the reply to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    ///
    /// This is more efficient than `serialize()` when you want to reuse a buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Status(s) => write_line(buf, prefix::STATUS, s.as_bytes()),
            Reply::Error(s) => write_line(buf, prefix::ERROR, s.as_bytes()),
            Reply::Integer(n) => write_line(buf, prefix::INTEGER, n.to_string().as_bytes()),
            Reply::Bulk(data) => write_bulk(buf, Some(data)),
            Reply::NullBulk => write_bulk(buf, None),
            Reply::Array(args) => {
                write_line(buf, prefix::ARRAY, args.len().to_string().as_bytes());
                for arg in args {
                    write_bulk(buf, arg.as_ref());
                }
            }
            Reply::EmptyArray => write_line(buf, prefix::ARRAY, b"0"),
        }
    }

    /// Returns true if this value is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Attempts to extract the inner string from Status or Bulk.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Reply::Status(s) => Some(s),
            Reply::Bulk(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Attempts to extract the inner integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Splits an array reply into a command name and its arguments.
    ///
    /// This is the shape a command executor consumes. Returns `None` for
    /// anything that is not a non-empty array.
    pub fn as_command(&self) -> Option<(&[u8], &[Option<Bytes>])> {
        match self {
            Reply::Array(args) => {
                let (name, rest) = args.split_first()?;
                Some((name.as_deref().unwrap_or_default(), rest))
            }
            _ => None,
        }
    }
}

fn write_line(buf: &mut Vec<u8>, prefix: u8, body: &[u8]) {
    buf.push(prefix);
    buf.extend_from_slice(body);
    buf.extend_from_slice(CRLF);
}

fn write_bulk(buf: &mut Vec<u8>, data: Option<&Bytes>) {
    match data {
        Some(data) => {
            write_line(buf, prefix::BULK_STRING, data.len().to_string().as_bytes());
            buf.extend_from_slice(data);
            buf.extend_from_slice(CRLF);
        }
        None => write_line(buf, prefix::BULK_STRING, b"-1"),
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{}", s),
            Reply::Error(s) => write!(f, "(error) {}", s),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Bulk(data) => fmt_bulk(f, data),
            Reply::NullBulk => write!(f, "(nil)"),
            Reply::Array(args) => {
                writeln!(f)?;
                for (i, arg) in args.iter().enumerate() {
                    write!(f, "{}) ", i + 1)?;
                    match arg {
                        Some(data) => fmt_bulk(f, data)?,
                        None => write!(f, "(nil)")?,
                    }
                    writeln!(f)?;
                }
                Ok(())
            }
            Reply::EmptyArray => write!(f, "(empty array)"),
        }
    }
}

fn fmt_bulk(f: &mut fmt::Formatter<'_>, data: &Bytes) -> fmt::Result {
    if let Ok(s) = std::str::from_utf8(data) {
        write!(f, "\"{}\"", s)
    } else {
        write!(f, "(binary data, {} bytes)", data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialize() {
        assert_eq!(Reply::status("OK").serialize(), b"+OK\r\n");
        assert_eq!(Reply::ok().serialize(), b"+OK\r\n");
    }

    #[test]
    fn test_error_serialize() {
        let value = Reply::error("ERR unknown command");
        assert_eq!(value.serialize(), b"-ERR unknown command\r\n");
    }

    #[test]
    fn test_integer_serialize() {
        assert_eq!(Reply::integer(1000).serialize(), b":1000\r\n");
        assert_eq!(Reply::integer(-42).serialize(), b":-42\r\n");
    }

    #[test]
    fn test_bulk_serialize() {
        let value = Reply::bulk(Bytes::from("hello"));
        assert_eq!(value.serialize(), b"$5\r\nhello\r\n");
    }

    #[test]
    fn test_null_bulk_serialize() {
        assert_eq!(Reply::null_bulk().serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_array_serialize() {
        let value = Reply::array(["GET", "name"]);
        assert_eq!(value.serialize(), b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
    }

    #[test]
    fn test_array_with_null_element_serialize() {
        let value = Reply::Array(vec![Some(Bytes::from("a")), None]);
        assert_eq!(value.serialize(), b"*2\r\n$1\r\na\r\n$-1\r\n");
    }

    #[test]
    fn test_empty_array() {
        assert_eq!(Reply::array(Vec::<Bytes>::new()), Reply::EmptyArray);
        assert_eq!(Reply::EmptyArray.serialize(), b"*0\r\n");
    }

    #[test]
    fn test_as_command() {
        let request = Reply::array(["SET", "key", "value"]);
        let (name, args) = request.as_command().unwrap();
        assert_eq!(name, b"SET");
        assert_eq!(args.len(), 2);

        assert!(Reply::EmptyArray.as_command().is_none());
        assert!(Reply::ok().as_command().is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(Reply::NullBulk.to_string(), "(nil)");
        assert_eq!(Reply::integer(7).to_string(), "(integer) 7");
        assert_eq!(Reply::bulk("hi").to_string(), "\"hi\"");
    }
}
