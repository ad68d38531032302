//! Command Table
//!
//! Resolves a command name to the frame sent to the backend. The table is
//! closed and built once: each entry names the wire command, the encoder
//! that validates and shapes the arguments, and the reply shape.
//!
//! ## Resolution
//!
//! ```text
//! "_RAW:object" ──────────────────────────────> raw frame  OBJECT ...
//! "hgetall"     ──> table["hgetall"] ─────────> typed frame HGETALL ...
//! "zrangewithscores" ─> table entry with a
//!                       different wire name ──> ZRANGE ... WITHSCORES
//! "object"      ──> not in table ─────────────> raw frame  OBJECT ...
//! ```
//!
//! Unknown names are never rejected here; the backend decides whether a
//! command exists.

use crate::commands::args::{
    encode_flat, encode_pairs, encode_scan, encode_set, encode_with_scores, encode_zadd,
    raw_frame, Encoder, ReplyShape,
};
use crate::commands::descriptor::CommandDescriptor;
use crate::error::BackendError;
use bytes::Bytes;
use std::collections::HashMap;

/// One typed command.
#[derive(Clone, Copy)]
pub struct CommandSpec {
    /// Name sent on the wire.
    pub wire: &'static str,
    pub encode: Encoder,
    pub reply: ReplyShape,
}

/// Which path a command took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Typed,
    Raw,
}

/// A command ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub frame: Vec<Bytes>,
    pub reply: ReplyShape,
    pub route: Route,
}

/// The dispatch table, keyed by lower-case command name.
pub struct CommandTable {
    commands: HashMap<&'static str, CommandSpec>,
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandTable {
    pub fn new() -> Self {
        use ReplyShape::*;

        let entries = [
            // String commands
            ("get", spec("GET", encode_flat, Plain)),
            ("set", spec("SET", encode_set, Plain)),
            ("del", spec("DEL", encode_flat, Plain)),
            ("exists", spec("EXISTS", encode_flat, Plain)),
            ("expire", spec("EXPIRE", encode_flat, Boolean)),
            ("ttl", spec("TTL", encode_flat, Plain)),
            ("incr", spec("INCR", encode_flat, Plain)),
            ("incrby", spec("INCRBY", encode_flat, Plain)),
            ("decr", spec("DECR", encode_flat, Plain)),
            ("decrby", spec("DECRBY", encode_flat, Plain)),
            ("mget", spec("MGET", encode_flat, Plain)),
            ("mset", spec("MSET", encode_pairs, Plain)),
            // Hash commands
            ("hget", spec("HGET", encode_flat, Plain)),
            ("hset", spec("HSET", encode_pairs, Plain)),
            ("hgetall", spec("HGETALL", encode_flat, Object)),
            ("hdel", spec("HDEL", encode_flat, Plain)),
            ("hincrby", spec("HINCRBY", encode_flat, Plain)),
            ("hexists", spec("HEXISTS", encode_flat, Boolean)),
            ("hkeys", spec("HKEYS", encode_flat, Plain)),
            ("hvals", spec("HVALS", encode_flat, Plain)),
            ("hlen", spec("HLEN", encode_flat, Plain)),
            // List commands
            ("lpush", spec("LPUSH", encode_flat, Plain)),
            ("rpush", spec("RPUSH", encode_flat, Plain)),
            ("lpop", spec("LPOP", encode_flat, Plain)),
            ("rpop", spec("RPOP", encode_flat, Plain)),
            ("lrange", spec("LRANGE", encode_flat, Plain)),
            ("llen", spec("LLEN", encode_flat, Plain)),
            ("lindex", spec("LINDEX", encode_flat, Plain)),
            ("lset", spec("LSET", encode_flat, Plain)),
            ("lrem", spec("LREM", encode_flat, Plain)),
            // Set commands
            ("sadd", spec("SADD", encode_flat, Plain)),
            ("srem", spec("SREM", encode_flat, Plain)),
            ("smembers", spec("SMEMBERS", encode_flat, Plain)),
            ("sismember", spec("SISMEMBER", encode_flat, Boolean)),
            ("scard", spec("SCARD", encode_flat, Plain)),
            ("spop", spec("SPOP", encode_flat, Plain)),
            ("srandmember", spec("SRANDMEMBER", encode_flat, Plain)),
            ("srandmembercount", spec("SRANDMEMBER", encode_flat, Plain)),
            // Sorted set commands
            ("zadd", spec("ZADD", encode_zadd, Plain)),
            ("zrange", spec("ZRANGE", encode_flat, Plain)),
            ("zrangewithscores", spec("ZRANGE", encode_with_scores, Scored)),
            ("zrem", spec("ZREM", encode_flat, Plain)),
            ("zscore", spec("ZSCORE", encode_flat, Float)),
            ("zrank", spec("ZRANK", encode_flat, Plain)),
            ("zcard", spec("ZCARD", encode_flat, Plain)),
            ("zincrby", spec("ZINCRBY", encode_flat, Float)),
            // Key commands
            ("keys", spec("KEYS", encode_flat, Plain)),
            ("scan", spec("SCAN", encode_scan, Scan)),
            ("type", spec("TYPE", encode_flat, Plain)),
            ("rename", spec("RENAME", encode_flat, Plain)),
            ("persist", spec("PERSIST", encode_flat, Boolean)),
            ("pttl", spec("PTTL", encode_flat, Plain)),
            ("expireat", spec("EXPIREAT", encode_flat, Boolean)),
            // Server commands
            ("ping", spec("PING", encode_flat, Plain)),
            ("flushdb", spec("FLUSHDB", encode_flat, Plain)),
            ("dbsize", spec("DBSIZE", encode_flat, Plain)),
            ("info", spec("INFO", encode_flat, Plain)),
        ];

        let commands = entries.into_iter().collect();

        Self { commands }
    }

    /// Looks up a typed command. Case-insensitive.
    pub fn lookup(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.get(name.to_ascii_lowercase().as_str())
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Turns a descriptor into a frame.
    ///
    /// Raw-marked names skip the table. Otherwise the typed entry is used
    /// when one exists, and the raw path is the fallback.
    pub fn resolve(&self, descriptor: &CommandDescriptor) -> Result<Resolved, BackendError> {
        if descriptor.is_raw() {
            return Ok(raw(descriptor));
        }

        match self.lookup(&descriptor.command) {
            Some(spec) => Ok(Resolved {
                frame: (spec.encode)(spec.wire, &descriptor.args)?,
                reply: spec.reply,
                route: Route::Typed,
            }),
            None => Ok(raw(descriptor)),
        }
    }
}

fn spec(wire: &'static str, encode: Encoder, reply: ReplyShape) -> CommandSpec {
    CommandSpec {
        wire,
        encode,
        reply,
    }
}

fn raw(descriptor: &CommandDescriptor) -> Resolved {
    Resolved {
        frame: raw_frame(descriptor.label(), &descriptor.args),
        reply: ReplyShape::Plain,
        route: Route::Raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolve(command: &str, args: serde_json::Value) -> Resolved {
        let args = args.as_array().cloned().unwrap_or_default();
        CommandTable::new()
            .resolve(&CommandDescriptor::new(command, args))
            .unwrap()
    }

    fn frame_text(resolved: &Resolved) -> Vec<String> {
        resolved
            .frame
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }

    #[test]
    fn test_typed_lookup_is_case_insensitive() {
        let r = resolve("GeT", json!(["name"]));
        assert_eq!(r.route, Route::Typed);
        assert_eq!(frame_text(&r), vec!["GET", "name"]);
    }

    #[test]
    fn test_name_exceptions() {
        let r = resolve("ZRANGEWITHSCORES", json!(["board", 0, -1]));
        assert_eq!(frame_text(&r), vec!["ZRANGE", "board", "0", "-1", "WITHSCORES"]);
        assert_eq!(r.reply, ReplyShape::Scored);

        let r = resolve("SRANDMEMBERCOUNT", json!(["s", 3]));
        assert_eq!(frame_text(&r), vec!["SRANDMEMBER", "s", "3"]);
    }

    #[test]
    fn test_unknown_command_falls_back_to_raw() {
        let r = resolve("object", json!(["encoding", "k"]));
        assert_eq!(r.route, Route::Raw);
        assert_eq!(frame_text(&r), vec!["OBJECT", "encoding", "k"]);
    }

    #[test]
    fn test_raw_marker_bypasses_table() {
        let table = CommandTable::new();
        // A typed GET would reject the object argument; raw stringifies it.
        let d = CommandDescriptor::raw("get", vec![json!({"a": 1})]);
        let r = table.resolve(&d).unwrap();
        assert_eq!(r.route, Route::Raw);
        assert_eq!(frame_text(&r), vec!["GET", r#"{"a":1}"#]);

        assert!(table
            .resolve(&CommandDescriptor::new("get", vec![json!({"a": 1})]))
            .is_err());
    }

    #[test]
    fn test_table_covers_command_families() {
        let table = CommandTable::new();
        for name in ["get", "hgetall", "lpush", "sadd", "zadd", "scan", "ping"] {
            assert!(table.lookup(name).is_some(), "missing {}", name);
        }
        assert!(table.lookup("multi").is_none());
        assert!(!table.is_empty());
    }
}
