//! Values exchanged with the backend
//!
//! Requests always go out as an array of bulk strings. Replies may be any
//! RESP2 value, which callers see through [`RespValue::into_json`].
//!
//! ```text
//! GET name       ->  *2\r\n$3\r\nGET\r\n$4\r\nname\r\n
//! "Ariz"         <-  $4\r\nAriz\r\n
//! nil            <-  $-1\r\n
//! ```

use bytes::Bytes;
use serde_json::Value;
use std::fmt;

/// Line terminator after every header and every bulk payload
pub const CRLF: &[u8] = b"\r\n";

/// First byte of every RESP2 value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Marker {
    Status = b'+',
    Error = b'-',
    Integer = b':',
    Bulk = b'$',
    Array = b'*',
}

impl Marker {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            b'+' => Marker::Status,
            b'-' => Marker::Error,
            b':' => Marker::Integer,
            b'$' => Marker::Bulk,
            b'*' => Marker::Array,
            _ => return None,
        })
    }
}

/// A command frame or a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// `+OK`, `+QUEUED`, `+PONG`
    SimpleString(String),
    /// `-ERR ...`, `-WRONGTYPE ...`
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    /// `$-1` and `*-1` both decode to this
    Null,
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    pub fn null() -> Self {
        RespValue::Null
    }

    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    pub fn ok() -> Self {
        Self::simple_string("OK")
    }

    /// Wraps encoded parts (name first) into a request frame.
    ///
    /// ```
    /// use redisbridge::protocol::RespValue;
    /// use bytes::Bytes;
    ///
    /// let frame = RespValue::command(vec![Bytes::from("DEL"), Bytes::from("cart:7")]);
    /// assert_eq!(frame.serialize(), b"*2\r\n$3\r\nDEL\r\n$6\r\ncart:7\r\n");
    /// ```
    pub fn command(parts: Vec<Bytes>) -> Self {
        RespValue::Array(parts.into_iter().map(RespValue::BulkString).collect())
    }

    fn marker(&self) -> Marker {
        match self {
            RespValue::SimpleString(_) => Marker::Status,
            RespValue::Error(_) => Marker::Error,
            RespValue::Integer(_) => Marker::Integer,
            RespValue::BulkString(_) | RespValue::Null => Marker::Bulk,
            RespValue::Array(_) => Marker::Array,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        self.serialize_into(&mut buf);
        buf
    }

    /// Appends the wire form to `buf`. Pipelined frames share one buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.marker() as u8);
        match self {
            RespValue::SimpleString(line) | RespValue::Error(line) => {
                write_line(buf, line.as_bytes())
            }
            RespValue::Integer(n) => write_line(buf, n.to_string().as_bytes()),
            RespValue::Null => write_line(buf, b"-1"),
            RespValue::BulkString(data) => {
                write_line(buf, data.len().to_string().as_bytes());
                write_line(buf, data);
            }
            RespValue::Array(items) => {
                write_line(buf, items.len().to_string().as_bytes());
                items.iter().for_each(|item| item.serialize_into(buf));
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Text of a status reply or a UTF-8 bulk string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            RespValue::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        if let RespValue::Integer(n) = self {
            Some(*n)
        } else {
            None
        }
    }

    pub fn into_array(self) -> Option<Vec<RespValue>> {
        if let RespValue::Array(items) = self {
            Some(items)
        } else {
            None
        }
    }

    /// The JSON a caller receives for this reply.
    ///
    /// Non UTF-8 bulk data is converted lossily. Error replies are normally
    /// turned into failures before this point; if one gets here it becomes
    /// its message text.
    pub fn into_json(self) -> Value {
        match self {
            RespValue::SimpleString(s) | RespValue::Error(s) => Value::String(s),
            RespValue::Integer(n) => Value::from(n),
            RespValue::BulkString(b) => Value::String(String::from_utf8_lossy(&b).into_owned()),
            RespValue::Null => Value::Null,
            RespValue::Array(items) => items.into_iter().map(RespValue::into_json).collect(),
        }
    }
}

fn write_line(buf: &mut Vec<u8>, line: &[u8]) {
    buf.extend_from_slice(line);
    buf.extend_from_slice(CRLF);
}

/// Single-line rendering used in log lines and error messages,
/// e.g. `[OK, 2, nil, ERR boom]`.
impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) | RespValue::Error(s) => f.write_str(s),
            RespValue::Integer(n) => write!(f, "{}", n),
            RespValue::BulkString(data) => match std::str::from_utf8(data) {
                Ok(text) => write!(f, "{:?}", text),
                Err(_) => write!(f, "<{} bytes>", data.len()),
            },
            RespValue::Null => f.write_str("nil"),
            RespValue::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}
