//! Incremental RESP Reply Parser
//!
//! Replies arrive over TCP in arbitrary fragments. The connection appends
//! whatever it reads to a buffer and asks the parser for the next complete
//! value:
//!
//! - `Ok(Some((value, consumed)))` - a full reply, `consumed` bytes may be dropped
//! - `Ok(None)` - the reply is incomplete, read more and try again
//! - `Err(ParseError)` - the peer is not speaking RESP; the connection is unusable
//!
//! A `MULTI`/`EXEC` batch produces several replies back to back, so the
//! caller loops until it has collected as many as it expects.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use std::num::ParseIntError;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Unknown type prefix byte
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative (but not -1 for null)
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Protocol violation (missing CRLF, nesting too deep)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth. `EXEC` replies nest one level.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Reply parser. Holds only the nesting depth of the value being decoded.
///
/// ```
/// use flashset::protocol::{RespParser, RespValue};
///
/// let mut parser = RespParser::new();
/// let (value, consumed) = parser.parse(b":1\r\n+OK").unwrap().unwrap();
/// assert_eq!(value, RespValue::Integer(1));
/// assert_eq!(consumed, 4);
/// assert!(parser.parse(b"+OK").unwrap().is_none());
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    depth: usize,
}

impl RespParser {
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to decode one value from the front of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        match buf[0] {
            prefix::SIMPLE_STRING => {
                Ok(read_line(buf)?.map(|(s, n)| (RespValue::SimpleString(s.to_string()), n)))
            }
            prefix::ERROR => Ok(read_line(buf)?.map(|(s, n)| (RespValue::Error(s.to_string()), n))),
            prefix::INTEGER => match read_line(buf)? {
                Some((s, n)) => Ok(Some((RespValue::Integer(parse_int(s)?), n))),
                None => Ok(None),
            },
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let (length, header_len) = match read_line(buf)? {
            Some((s, n)) => (parse_int(s)?, n),
            None => return Ok(None),
        };

        if length == -1 {
            return Ok(Some((RespValue::Null, header_len)));
        }
        if length < 0 {
            return Err(ParseError::InvalidBulkLength(length));
        }

        let length = length as usize;
        if length > MAX_BULK_SIZE {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        let total_needed = header_len + length + 2;
        if buf.len() < total_needed {
            return Ok(None);
        }

        if &buf[header_len + length..total_needed] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[header_len..header_len + length]);
        Ok(Some((RespValue::BulkString(data), total_needed)))
    }

    /// `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let (count, mut consumed) = match read_line(buf)? {
            Some((s, n)) => (parse_int(s)?, n),
            None => return Ok(None),
        };

        if count == -1 {
            return Ok(Some((RespValue::Null, consumed)));
        }
        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        let count = count as usize;
        let mut elements = Vec::with_capacity(count.min(1024));

        self.depth += 1;
        for _ in 0..count {
            match self.parse_value(&buf[consumed..])? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => return Ok(None),
            }
        }
        self.depth -= 1;

        Ok(Some((RespValue::Array(elements), consumed)))
    }
}

/// Reads the line after the prefix byte. Returns its text and the number of
/// bytes including prefix and CRLF.
fn read_line(buf: &[u8]) -> ParseResult<Option<(&str, usize)>> {
    match find_crlf(&buf[1..]) {
        Some(pos) => {
            let s = std::str::from_utf8(&buf[1..1 + pos])
                .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
            Ok(Some((s, 1 + pos + 2)))
        }
        None => Ok(None),
    }
}

fn parse_int(s: &str) -> ParseResult<i64> {
    s.parse()
        .map_err(|e: ParseIntError| ParseError::InvalidInteger(format!("{:?}: {}", s, e)))
}

#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Decodes a single reply with a fresh parser.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_reply() {
        let (value, consumed) = parse_message(b"+QUEUED\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::queued());
        assert_eq!(consumed, 9);
    }

    #[test]
    fn test_parse_error_reply() {
        let input = b"-ERR value is not a valid float\r\n";
        let (value, consumed) = parse_message(input).unwrap().unwrap();
        assert_eq!(value, RespValue::error("ERR value is not a valid float"));
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_parse_integer_reply() {
        let (value, _) = parse_message(b":-42\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Integer(-42));
    }

    #[test]
    fn test_parse_score_bulk_string() {
        let (value, consumed) = parse_message(b"$3\r\n6.5\r\n").unwrap().unwrap();
        assert_eq!(value.as_f64(), Some(6.5));
        assert_eq!(consumed, 9);
    }

    #[test]
    fn test_parse_null_rank() {
        let (value, consumed) = parse_message(b"$-1\r\n").unwrap().unwrap();
        assert!(value.is_null());
        assert_eq!(consumed, 5);

        let (value, _) = parse_message(b"*-1\r\n").unwrap().unwrap();
        assert!(value.is_null());
    }

    #[test]
    fn test_parse_withscores_reply() {
        let input = b"*4\r\n$1\r\na\r\n$1\r\n1\r\n$1\r\nb\r\n$1\r\n2\r\n";
        let (value, consumed) = parse_message(input).unwrap().unwrap();
        assert_eq!(consumed, input.len());
        let items = value.into_array().unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].as_bytes(), Some(&b"a"[..]));
        assert_eq!(items[3].as_f64(), Some(2.0));
    }

    #[test]
    fn test_parse_exec_reply_with_embedded_error() {
        let input = b"*2\r\n:1\r\n-WRONGTYPE Operation against a key\r\n";
        let (value, _) = parse_message(input).unwrap().unwrap();
        let items = value.into_array().unwrap();
        assert_eq!(items[0], RespValue::Integer(1));
        assert!(items[1].is_error());
    }

    #[test]
    fn test_incomplete_replies() {
        assert!(parse_message(b"").unwrap().is_none());
        assert!(parse_message(b":12").unwrap().is_none());
        assert!(parse_message(b"$5\r\nhel").unwrap().is_none());
        assert!(parse_message(b"*2\r\n$1\r\na\r\n").unwrap().is_none());
    }

    #[test]
    fn test_back_to_back_replies() {
        let input = b"+OK\r\n+QUEUED\r\n";
        let mut parser = RespParser::new();
        let (first, consumed) = parser.parse(input).unwrap().unwrap();
        assert_eq!(first, RespValue::ok());
        let (second, _) = parser.parse(&input[consumed..]).unwrap().unwrap();
        assert_eq!(second, RespValue::queued());
    }

    #[test]
    fn test_unknown_prefix_is_rejected() {
        assert_eq!(
            parse_message(b"@oops\r\n"),
            Err(ParseError::UnknownPrefix(b'@'))
        );
    }

    #[test]
    fn test_invalid_integer() {
        let result = parse_message(b":not_a_number\r\n");
        assert!(matches!(result, Err(ParseError::InvalidInteger(_))));
    }

    #[test]
    fn test_bulk_string_missing_crlf() {
        let result = parse_message(b"$2\r\nabXY");
        assert!(matches!(result, Err(ParseError::ProtocolError(_))));
    }

    #[test]
    fn test_binary_member() {
        let input = b"$5\r\nhel\x00o\r\n";
        let (value, _) = parse_message(input).unwrap().unwrap();
        assert_eq!(value, RespValue::BulkString(Bytes::from(&b"hel\x00o"[..])));
    }
}
