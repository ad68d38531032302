//! RESP Protocol Implementation
//!
//! The bridge is a RESP client: it serializes command frames and decodes
//! the backend's replies.
//!
//! - `types`: the `RespValue` enum, serialization and JSON conversion
//! - `parser`: incremental reply parser
//!
//! ## Example
//!
//! ```
//! use redisbridge::protocol::{parse_message, RespValue};
//! use bytes::Bytes;
//!
//! let frame = RespValue::command(vec![Bytes::from("PING")]);
//! assert_eq!(frame.serialize(), b"*1\r\n$4\r\nPING\r\n");
//!
//! let (reply, _) = parse_message(b"+PONG\r\n").unwrap().unwrap();
//! assert_eq!(reply.as_str(), Some("PONG"));
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;
