//! Incremental RESP Reply Parser
//!
//! Replies arrive over a TCP stream, so a read may contain half a reply or
//! several pipelined replies at once. The parser therefore never consumes
//! input itself; it reports how many bytes a complete value used and lets
//! the connection advance its buffer.
//!
//! `parse` returns:
//! - `Ok(Some((value, consumed)))` - a complete value was decoded
//! - `Ok(None)` - the buffer holds an incomplete value, read more
//! - `Err(ParseError)` - the backend sent something that is not RESP

use crate::protocol::types::{Marker, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Ways a reply can fail to decode.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// A negative bulk or array length other than the `-1` null marker
    #[error("invalid length: {0}")]
    InvalidLength(i64),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("reply too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

pub type ParseResult<T> = Result<T, ParseError>;

type Decoded = Option<(RespValue, usize)>;

/// Largest bulk payload accepted from the backend (512 MB)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Deepest array nesting accepted from the backend
pub const MAX_NESTING_DEPTH: usize = 32;

/// Reply decoder used by the connection read loop.
///
/// ```ignore
/// let mut parser = RespParser::new();
/// while let Some((reply, consumed)) = parser.parse(&read_buf)? {
///     read_buf.advance(consumed);
///     pending.push(reply);
/// }
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    decoded: u64,
}

impl RespParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes the reply at the front of `buf`, if it is complete.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Decoded> {
        let result = decode(buf, 0)?;
        if result.is_some() {
            self.decoded += 1;
        }
        Ok(result)
    }

    /// Number of complete replies decoded so far.
    pub fn decoded(&self) -> u64 {
        self.decoded
    }
}

fn decode(buf: &[u8], depth: usize) -> ParseResult<Decoded> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };
    if depth > MAX_NESTING_DEPTH {
        return Err(ParseError::ProtocolError(format!(
            "reply nested deeper than {}",
            MAX_NESTING_DEPTH
        )));
    }
    let marker = Marker::from_byte(first).ok_or(ParseError::UnknownPrefix(first))?;

    let Some((line, header)) = read_line(buf)? else {
        return Ok(None);
    };
    match marker {
        Marker::Status => Ok(Some((RespValue::SimpleString(line.to_string()), header))),
        Marker::Error => Ok(Some((RespValue::Error(line.to_string()), header))),
        Marker::Integer => Ok(Some((RespValue::Integer(parse_int(line)?), header))),
        Marker::Bulk => match parse_length(line)? {
            None => Ok(Some((RespValue::Null, header))),
            Some(len) => decode_bulk(buf, header, len),
        },
        Marker::Array => match parse_length(line)? {
            None => Ok(Some((RespValue::Null, header))),
            Some(count) => decode_array(buf, header, count, depth),
        },
    }
}

/// `$<len>\r\n<data>\r\n`, with the header already read.
fn decode_bulk(buf: &[u8], header: usize, len: usize) -> ParseResult<Decoded> {
    if len > MAX_BULK_SIZE {
        return Err(ParseError::MessageTooLarge {
            size: len,
            max: MAX_BULK_SIZE,
        });
    }
    let end = header + len;
    if buf.len() < end + CRLF.len() {
        return Ok(None);
    }
    if &buf[end..end + CRLF.len()] != CRLF {
        return Err(ParseError::ProtocolError(
            "bulk payload not followed by CRLF".to_string(),
        ));
    }
    let data = Bytes::copy_from_slice(&buf[header..end]);
    Ok(Some((RespValue::BulkString(data), end + CRLF.len())))
}

/// `*<count>\r\n` followed by `count` nested values.
fn decode_array(buf: &[u8], header: usize, count: usize, depth: usize) -> ParseResult<Decoded> {
    let mut items = Vec::with_capacity(count.min(1024));
    let mut offset = header;
    while items.len() < count {
        let Some((item, used)) = decode(&buf[offset..], depth + 1)? else {
            return Ok(None);
        };
        items.push(item);
        offset += used;
    }
    Ok(Some((RespValue::Array(items), offset)))
}

/// Text after the marker byte, and the bytes used through the CRLF.
fn read_line(buf: &[u8]) -> ParseResult<Option<(&str, usize)>> {
    let body = &buf[1..];
    let Some(pos) = body.windows(CRLF.len()).position(|w| w == CRLF) else {
        return Ok(None);
    };
    let line =
        std::str::from_utf8(&body[..pos]).map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
    Ok(Some((line, 1 + pos + CRLF.len())))
}

fn parse_int(line: &str) -> ParseResult<i64> {
    line.parse()
        .map_err(|e: std::num::ParseIntError| ParseError::InvalidInteger(e.to_string()))
}

/// `-1` is the null marker and yields `None`.
fn parse_length(line: &str) -> ParseResult<Option<usize>> {
    match parse_int(line)? {
        -1 => Ok(None),
        n if n < 0 => Err(ParseError::InvalidLength(n)),
        n => Ok(Some(n as usize)),
    }
}

/// Decodes a single reply with a fresh parser.
pub fn parse_message(buf: &[u8]) -> ParseResult<Decoded> {
    RespParser::new().parse(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_reply() {
        let (value, used) = parse_message(b"+OK\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::ok());
        assert_eq!(used, 5);
    }

    #[test]
    fn test_parse_error_reply() {
        let input = b"-WRONGTYPE Operation against a key holding the wrong kind of value\r\n";
        let (value, used) = parse_message(input).unwrap().unwrap();
        assert!(value.is_error());
        assert_eq!(used, input.len());
    }

    #[test]
    fn test_parse_integer() {
        let (value, _) = parse_message(b":-42\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Integer(-42));
    }

    #[test]
    fn test_parse_bulk_and_null() {
        let (value, used) = parse_message(b"$5\r\nhello\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::BulkString(Bytes::from("hello")));
        assert_eq!(used, 11);

        let (value, used) = parse_message(b"$-1\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Null);
        assert_eq!(used, 5);

        let (value, _) = parse_message(b"*-1\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Null);
    }

    #[test]
    fn test_incomplete_replies_need_more_data() {
        assert!(parse_message(b"+OK").unwrap().is_none());
        assert!(parse_message(b"$5\r\nhel").unwrap().is_none());
        assert!(parse_message(b"*2\r\n:1\r\n").unwrap().is_none());
        assert!(parse_message(b"").unwrap().is_none());
    }

    #[test]
    fn test_exec_reply() {
        // EXEC result for SET + INCR + GET
        let input = b"*3\r\n+OK\r\n:2\r\n$1\r\n2\r\n";
        let (value, used) = parse_message(input).unwrap().unwrap();
        assert_eq!(
            value,
            RespValue::Array(vec![
                RespValue::ok(),
                RespValue::Integer(2),
                RespValue::BulkString(Bytes::from("2")),
            ])
        );
        assert_eq!(used, input.len());
    }

    #[test]
    fn test_pipelined_replies_consume_one_at_a_time() {
        let input = b"+QUEUED\r\n+QUEUED\r\n";
        let (value, used) = parse_message(input).unwrap().unwrap();
        assert_eq!(value, RespValue::simple_string("QUEUED"));
        assert_eq!(used, 9);
        let (value, _) = parse_message(&input[used..]).unwrap().unwrap();
        assert_eq!(value, RespValue::simple_string("QUEUED"));
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
        assert!(matches!(
            parse_message(b":nope\r\n"),
            Err(ParseError::InvalidInteger(_))
        ));
    }

    #[test]
    fn test_negative_lengths() {
        assert_eq!(parse_message(b"$-2\r\n"), Err(ParseError::InvalidLength(-2)));
        assert_eq!(parse_message(b"*-5\r\n"), Err(ParseError::InvalidLength(-5)));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let input = "*1\r\n".repeat(MAX_NESTING_DEPTH + 2) + ":1\r\n";
        assert!(matches!(
            parse_message(input.as_bytes()),
            Err(ParseError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_parser_counts_complete_replies() {
        let mut parser = RespParser::new();
        assert!(parser.parse(b"$3\r\nab").unwrap().is_none());
        assert!(parser.parse(b":7\r\n").unwrap().is_some());
        assert_eq!(parser.decoded(), 1);
    }

    #[test]
    fn test_bulk_missing_crlf() {
        assert!(matches!(
            parse_message(b"$2\r\nabXY"),
            Err(ParseError::ProtocolError(_))
        ));
    }
}
