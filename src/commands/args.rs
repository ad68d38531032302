//! Argument encoding and reply shaping.
//!
//! Two encodings exist. The raw path stringifies anything it is given
//! (`null` becomes an empty string, objects and arrays become JSON text).
//! Typed encoders are stricter: they understand the option objects their
//! command takes and reject argument shapes the command cannot accept.

use crate::error::BackendError;
use crate::protocol::RespValue;
use bytes::Bytes;
use serde_json::{Map, Number, Value};

/// Builds a wire frame from the typed arguments of a command.
pub type Encoder = fn(&'static str, &[Value]) -> Result<Vec<Bytes>, BackendError>;

/// Raw-path argument serialization.
pub fn serialize_arg(arg: &Value) -> Bytes {
    match arg {
        Value::Null => Bytes::new(),
        Value::String(s) => Bytes::from(s.clone()),
        Value::Object(_) | Value::Array(_) => Bytes::from(arg.to_string()),
        other => Bytes::from(other.to_string()),
    }
}

/// Frame for the raw path: upper-cased name followed by stringified args.
pub fn raw_frame(name: &str, args: &[Value]) -> Vec<Bytes> {
    let mut frame = Vec::with_capacity(args.len() + 1);
    frame.push(Bytes::from(name.to_uppercase()));
    frame.extend(args.iter().map(serialize_arg));
    frame
}

fn scalar(command: &str, arg: &Value) -> Result<Bytes, BackendError> {
    match arg {
        Value::String(s) => Ok(Bytes::from(s.clone())),
        Value::Number(n) => Ok(Bytes::from(n.to_string())),
        other => Err(BackendError::InvalidArgument(format!(
            "{} does not accept {} as an argument",
            command,
            type_name(other)
        ))),
    }
}

/// Pushes a scalar, or each element of an array of scalars.
fn push_flat(frame: &mut Vec<Bytes>, command: &str, arg: &Value) -> Result<(), BackendError> {
    match arg {
        Value::Array(items) => {
            for item in items {
                frame.push(scalar(command, item)?);
            }
            Ok(())
        }
        other => {
            frame.push(scalar(command, other)?);
            Ok(())
        }
    }
}

fn push_map(frame: &mut Vec<Bytes>, command: &str, map: &Map<String, Value>) -> Result<(), BackendError> {
    for (field, value) in map {
        frame.push(Bytes::from(field.clone()));
        frame.push(scalar(command, value)?);
    }
    Ok(())
}

fn flag(options: &Map<String, Value>, name: &str) -> bool {
    options.get(name).is_some_and(|v| v.as_bool().unwrap_or(!v.is_null()))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Scalars and arrays of scalars.
pub fn encode_flat(wire: &'static str, args: &[Value]) -> Result<Vec<Bytes>, BackendError> {
    let mut frame = vec![Bytes::from_static(wire.as_bytes())];
    for arg in args {
        push_flat(&mut frame, wire, arg)?;
    }
    Ok(frame)
}

/// Like [`encode_flat`] but objects expand to field/value pairs
/// (`MSET {a: 1}`, `HSET key {f: v}`).
pub fn encode_pairs(wire: &'static str, args: &[Value]) -> Result<Vec<Bytes>, BackendError> {
    let mut frame = vec![Bytes::from_static(wire.as_bytes())];
    for arg in args {
        match arg {
            Value::Object(map) => push_map(&mut frame, wire, map)?,
            other => push_flat(&mut frame, wire, other)?,
        }
    }
    Ok(frame)
}

/// `SET key value [options]`
pub fn encode_set(wire: &'static str, args: &[Value]) -> Result<Vec<Bytes>, BackendError> {
    let (positional, options) = split_options(args);
    if positional.len() != 2 {
        return Err(BackendError::InvalidArgument(format!(
            "{} expects a key and a value",
            wire
        )));
    }

    let mut frame = encode_flat(wire, positional)?;
    if let Some(options) = options {
        for expiry in ["EX", "PX", "EXAT", "PXAT"] {
            if let Some(value) = options.get(expiry) {
                frame.push(Bytes::from_static(expiry.as_bytes()));
                frame.push(scalar(wire, value)?);
            }
        }
        for name in ["NX", "XX", "KEEPTTL", "GET"] {
            if flag(options, name) {
                frame.push(Bytes::from_static(name.as_bytes()));
            }
        }
    }
    Ok(frame)
}

/// `ZADD key [NX|XX] [GT|LT] [CH] score member ...` from
/// `key, {score, value} | [{score, value}], [options]`.
pub fn encode_zadd(wire: &'static str, args: &[Value]) -> Result<Vec<Bytes>, BackendError> {
    // A trailing `{score, value}` is a member, not an options bag.
    let (positional, options) = match split_options(args) {
        (_, Some(options)) if options.contains_key("score") => (args, None),
        split => split,
    };
    let [key, members @ ..] = positional else {
        return Err(BackendError::InvalidArgument(format!("{} expects a key", wire)));
    };

    let mut frame = vec![Bytes::from_static(wire.as_bytes()), scalar(wire, key)?];
    if let Some(options) = options {
        for name in ["NX", "XX", "GT", "LT", "CH"] {
            if flag(options, name) {
                frame.push(Bytes::from_static(name.as_bytes()));
            }
        }
    }

    let mut pushed = 0;
    for member in members {
        let list = match member {
            Value::Array(items) => items.as_slice(),
            single => std::slice::from_ref(single),
        };
        for item in list {
            let (Some(score), Some(value)) = (item.get("score"), item.get("value")) else {
                return Err(BackendError::InvalidArgument(format!(
                    "{} members must be {{score, value}} objects",
                    wire
                )));
            };
            frame.push(scalar(wire, score)?);
            frame.push(scalar(wire, value)?);
            pushed += 1;
        }
    }

    if pushed == 0 {
        return Err(BackendError::InvalidArgument(format!(
            "{} expects at least one member",
            wire
        )));
    }
    Ok(frame)
}

/// `ZRANGE key start stop WITHSCORES`
pub fn encode_with_scores(wire: &'static str, args: &[Value]) -> Result<Vec<Bytes>, BackendError> {
    let mut frame = encode_flat(wire, args)?;
    frame.push(Bytes::from_static(b"WITHSCORES"));
    Ok(frame)
}

/// `SCAN cursor [MATCH pattern] [COUNT n] [TYPE type]`
pub fn encode_scan(wire: &'static str, args: &[Value]) -> Result<Vec<Bytes>, BackendError> {
    let (positional, options) = split_options(args);
    let mut frame = encode_flat(wire, positional)?;
    if let Some(options) = options {
        for name in ["MATCH", "COUNT", "TYPE"] {
            if let Some(value) = options.get(name) {
                frame.push(Bytes::from_static(name.as_bytes()));
                frame.push(scalar(wire, value)?);
            }
        }
    }
    Ok(frame)
}

/// A trailing object is an options bag.
fn split_options(args: &[Value]) -> (&[Value], Option<&Map<String, Value>>) {
    match args.split_last() {
        Some((Value::Object(options), rest)) => (rest, Some(options)),
        _ => (args, None),
    }
}

/// How a typed command's reply is shaped for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    Plain,
    /// Integer 0/1 as false/true
    Boolean,
    /// Bulk string score as a number
    Float,
    /// Flat field/value array as an object
    Object,
    /// Flat member/score array as `[{value, score}]`
    Scored,
    /// `[cursor, keys]` as `{cursor, keys}`
    Scan,
}

impl ReplyShape {
    pub fn decode(self, reply: RespValue) -> Result<Value, BackendError> {
        if let RespValue::Error(msg) = reply {
            return Err(BackendError::Reply(msg));
        }

        let value = match self {
            ReplyShape::Plain => reply.into_json(),
            ReplyShape::Boolean => match reply {
                RespValue::Integer(n) => Value::Bool(n != 0),
                other => other.into_json(),
            },
            ReplyShape::Float => match reply.as_str().and_then(|s| s.parse::<f64>().ok()) {
                Some(score) => float(score),
                None => reply.into_json(),
            },
            ReplyShape::Object => {
                let mut map = Map::new();
                for pair in pairs(reply)? {
                    map.insert(text(pair.0), pair.1.into_json());
                }
                Value::Object(map)
            }
            ReplyShape::Scored => {
                let mut members = Vec::new();
                for (value, score) in pairs(reply)? {
                    let score = score.as_str().and_then(|s| s.parse::<f64>().ok()).unwrap_or(0.0);
                    let mut entry = Map::new();
                    entry.insert("value".to_string(), Value::String(text(value)));
                    entry.insert("score".to_string(), float(score));
                    members.push(Value::Object(entry));
                }
                Value::Array(members)
            }
            ReplyShape::Scan => {
                let parts = reply.into_array().unwrap_or_default();
                let mut parts = parts.into_iter();
                let cursor = parts.next().map(|c| c.into_json()).unwrap_or(Value::Null);
                let cursor = match cursor.as_str().and_then(|s| s.parse::<u64>().ok()) {
                    Some(n) => Value::from(n),
                    None => cursor,
                };
                let keys = parts.next().map(|k| k.into_json()).unwrap_or(Value::Array(vec![]));
                let mut map = Map::new();
                map.insert("cursor".to_string(), cursor);
                map.insert("keys".to_string(), keys);
                Value::Object(map)
            }
        };
        Ok(value)
    }
}

fn float(n: f64) -> Value {
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

fn text(value: RespValue) -> String {
    match value.into_json() {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn pairs(reply: RespValue) -> Result<Vec<(RespValue, RespValue)>, BackendError> {
    let items = match reply {
        RespValue::Null => return Ok(Vec::new()),
        RespValue::Array(items) => items,
        other => return Err(BackendError::UnexpectedReply(other.to_string())),
    };
    if items.len() % 2 != 0 {
        return Err(BackendError::UnexpectedReply(
            "odd number of elements in pair reply".to_string(),
        ));
    }
    let mut iter = items.into_iter();
    let mut out = Vec::new();
    while let (Some(a), Some(b)) = (iter.next(), iter.next()) {
        out.push((a, b));
    }
    Ok(out)
}
