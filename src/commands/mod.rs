//! Command Resolution
//!
//! Turns `(name, args)` descriptors into backend frames.
//!
//! ```text
//! CommandDescriptor
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  CommandTable   │  typed entry? ──yes──> typed encoder + reply shape
//! │                 │
//! │                 │  otherwise ──────────> raw frame, plain reply
//! └────────┬────────┘
//!          │
//!          ▼
//!     Backend frame
//! ```
//!
//! ## Command Families
//!
//! - String: `GET`, `SET`, `DEL`, `EXISTS`, `EXPIRE`, `TTL`, `INCR[BY]`,
//!   `DECR[BY]`, `MGET`, `MSET`
//! - Hash: `HGET`, `HSET`, `HGETALL`, `HDEL`, `HINCRBY`, `HEXISTS`, `HKEYS`,
//!   `HVALS`, `HLEN`
//! - List: `LPUSH`, `RPUSH`, `LPOP`, `RPOP`, `LRANGE`, `LLEN`, `LINDEX`,
//!   `LSET`, `LREM`
//! - Set: `SADD`, `SREM`, `SMEMBERS`, `SISMEMBER`, `SCARD`, `SPOP`,
//!   `SRANDMEMBER`
//! - Sorted set: `ZADD`, `ZRANGE`, `ZRANGEWITHSCORES`, `ZREM`, `ZSCORE`,
//!   `ZRANK`, `ZCARD`, `ZINCRBY`
//! - Key: `KEYS`, `SCAN`, `TYPE`, `RENAME`, `PERSIST`, `PTTL`, `EXPIREAT`
//! - Server: `PING`, `FLUSHDB`, `DBSIZE`, `INFO`
//!
//! Everything else is sent raw.

pub mod args;
pub mod descriptor;
pub mod handler;

pub use args::{serialize_arg, ReplyShape};
pub use descriptor::{CommandDescriptor, RAW_PREFIX};
pub use handler::{CommandTable, Resolved, Route};
