//! Command descriptors.

use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix marking a command that must be sent verbatim, bypassing the
/// typed command table.
pub const RAW_PREFIX: &str = "_RAW:";

/// A command name and its ordered arguments.
///
/// Serialized as `{"command": "...", "args": [...]}`, which is also the
/// transaction batch entry format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub command: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl CommandDescriptor {
    pub fn new(command: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    /// A descriptor that always takes the raw path.
    pub fn raw(command: &str, args: Vec<Value>) -> Self {
        Self::new(format!("{}{}", RAW_PREFIX, command), args)
    }

    /// The command name with any raw marker removed.
    pub fn label(&self) -> &str {
        self.command
            .strip_prefix(RAW_PREFIX)
            .unwrap_or(&self.command)
    }

    pub fn is_raw(&self) -> bool {
        self.command.starts_with(RAW_PREFIX)
    }

    /// Validates a batch received as loose JSON. Every entry must be an
    /// object with a string `command`; `args` may be omitted. The first bad
    /// entry fails the whole batch.
    pub fn batch_from_json(entries: &[Value]) -> Result<Vec<Self>, BridgeError> {
        entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let command = entry
                    .get("command")
                    .and_then(Value::as_str)
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| {
                        BridgeError::validation(format!(
                            "Invalid command format at index {}: each command must have a \"command\" string property",
                            index
                        ))
                    })?;

                let args = match entry.get("args") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(args)) => args.clone(),
                    Some(other) => vec![other.clone()],
                };

                Ok(Self::new(command, args))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_label() {
        let d = CommandDescriptor::raw("object", vec![json!("encoding"), json!("k")]);
        assert!(d.is_raw());
        assert_eq!(d.label(), "object");
        assert_eq!(CommandDescriptor::new("GET", vec![]).label(), "GET");
    }

    #[test]
    fn test_batch_from_json() {
        let batch = CommandDescriptor::batch_from_json(&[
            json!({"command": "SET", "args": ["k", "v"]}),
            json!({"command": "INCR", "args": "n"}),
            json!({"command": "PING"}),
        ])
        .unwrap();
        assert_eq!(batch[0].args, vec![json!("k"), json!("v")]);
        assert_eq!(batch[1].args, vec![json!("n")]);
        assert!(batch[2].args.is_empty());
    }

    #[test]
    fn test_batch_rejects_missing_command() {
        let err = CommandDescriptor::batch_from_json(&[
            json!({"command": "SET", "args": ["k", "v"]}),
            json!({"args": ["oops"]}),
        ])
        .unwrap_err();
        match err {
            BridgeError::Validation(msg) => assert!(msg.contains("index 1")),
            other => panic!("expected validation error, got {:?}", other),
        }

        assert!(CommandDescriptor::batch_from_json(&[json!({"command": 5})]).is_err());
        assert!(CommandDescriptor::batch_from_json(&[json!("GET")]).is_err());
    }
}
