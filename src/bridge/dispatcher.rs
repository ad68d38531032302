//! Command Dispatcher
//!
//! The single path every command takes to the backend:
//!
//! ```text
//!   wait for connection ──> start clock ──> resolve ──> backend call
//!                                                           │
//!                              profiler.record[_error] <────┘
//! ```
//!
//! The clock starts before resolution so a command the encoder rejects is
//! still timed and recorded like any other failure.

use crate::commands::{CommandDescriptor, CommandTable, ReplyShape};
use crate::connection::{ConnectionManager, Handle};
use crate::error::{BackendError, BridgeError, Result};
use crate::profiler::{Profiler, Sample};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

/// Log label for a whole transaction batch.
pub const MULTI_EXEC_LABEL: &str = "MULTI/EXEC";

pub struct Dispatcher {
    connection: Arc<ConnectionManager>,
    table: Arc<CommandTable>,
    profiler: Arc<Profiler>,
}

impl Dispatcher {
    pub fn new(
        connection: Arc<ConnectionManager>,
        table: Arc<CommandTable>,
        profiler: Arc<Profiler>,
    ) -> Self {
        Self {
            connection,
            table,
            profiler,
        }
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn profiler(&self) -> &Arc<Profiler> {
        &self.profiler
    }

    /// Executes one command on behalf of `caller`.
    ///
    /// Waits for the shared connection, then times and records the call
    /// whether it succeeds or not.
    pub async fn execute(&self, caller: &str, descriptor: &CommandDescriptor) -> Result<Value> {
        let handle = self.connection.wait_until_ready().await;

        let start = Instant::now();
        let outcome = self.send(&handle, descriptor).await;
        let sample = Sample {
            caller,
            command: descriptor.label(),
            args: &descriptor.args,
            latency_ms: elapsed_ms(start),
        };

        match outcome {
            Ok(value) => {
                self.profiler.record(sample);
                Ok(value)
            }
            Err(e) => {
                self.profiler.record_error(sample, &e);
                Err(e)
            }
        }
    }

    /// Executes a batch as one MULTI/EXEC unit and returns the results in
    /// submission order.
    ///
    /// Every entry is resolved before anything is sent, so a malformed entry
    /// fails the batch without a backend call. One log entry covers the
    /// whole batch.
    pub async fn execute_batch(
        &self,
        caller: &str,
        descriptors: &[CommandDescriptor],
    ) -> Result<Vec<Value>> {
        let handle = self.connection.wait_until_ready().await;

        let start = Instant::now();
        let outcome = self.send_batch(&handle, descriptors).await;
        let args = batch_args(descriptors);
        let sample = Sample {
            caller,
            command: MULTI_EXEC_LABEL,
            args: &args,
            latency_ms: elapsed_ms(start),
        };

        match outcome {
            Ok(values) => {
                self.profiler.record(sample);
                Ok(values)
            }
            Err(e) => {
                self.profiler.record_error(sample, &e);
                Err(e)
            }
        }
    }

    /// Records a batch that was dropped before reaching the backend.
    pub fn record_discard(&self, caller: &str, descriptors: &[CommandDescriptor]) {
        let args = batch_args(descriptors);
        self.profiler.record(Sample {
            caller,
            command: MULTI_EXEC_LABEL,
            args: &args,
            latency_ms: 0.0,
        });
    }

    async fn send(&self, handle: &Handle, descriptor: &CommandDescriptor) -> Result<Value> {
        let resolved = self.table.resolve(descriptor)?;
        trace!(command = %descriptor.label(), route = ?resolved.route, "Dispatching");

        let reply = handle.backend().call(resolved.frame).await?;
        Ok(resolved.reply.decode(reply)?)
    }

    async fn send_batch(
        &self,
        handle: &Handle,
        descriptors: &[CommandDescriptor],
    ) -> Result<Vec<Value>> {
        let mut frames = Vec::with_capacity(descriptors.len());
        let mut shapes: Vec<ReplyShape> = Vec::with_capacity(descriptors.len());

        for (index, descriptor) in descriptors.iter().enumerate() {
            if descriptor.label().is_empty() {
                return Err(BridgeError::validation(format!(
                    "Invalid command format at index {}: each command must have a \"command\" string property",
                    index
                )));
            }
            let resolved = self.table.resolve(descriptor)?;
            frames.push(resolved.frame);
            shapes.push(resolved.reply);
        }

        let replies = handle.backend().transaction(frames).await?;
        if replies.len() != shapes.len() {
            return Err(BackendError::UnexpectedReply(format!(
                "EXEC returned {} replies for {} commands",
                replies.len(),
                shapes.len()
            ))
            .into());
        }

        let values = shapes
            .into_iter()
            .zip(replies)
            .map(|(shape, reply)| shape.decode(reply))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(values)
    }
}

fn batch_args(descriptors: &[CommandDescriptor]) -> Vec<Value> {
    descriptors
        .iter()
        .map(|d| serde_json::to_value(d).unwrap_or(Value::Null))
        .collect()
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::{bridge_parts, ScriptedBackend};
    use crate::config::settings::UI;
    use crate::protocol::RespValue;
    use serde_json::json;

    #[tokio::test]
    async fn test_typed_command_decodes_reply() {
        let backend = ScriptedBackend::new();
        backend.reply("HGETALL", RespValue::array(vec![
            RespValue::bulk_string("name"),
            RespValue::bulk_string("ada"),
        ]));
        let (dispatcher, _) = bridge_parts(&backend, &[]);

        let value = dispatcher
            .execute("shop", &CommandDescriptor::new("hgetall", vec![json!("user:1")]))
            .await
            .unwrap();
        assert_eq!(value, json!({"name": "ada"}));
        assert_eq!(backend.sent(), vec![vec!["HGETALL", "user:1"]]);
    }

    #[tokio::test]
    async fn test_unknown_command_round_trips_raw() {
        let backend = ScriptedBackend::new();
        backend.reply("OBJECT", RespValue::bulk_string("listpack"));
        let (dispatcher, _) = bridge_parts(&backend, &[]);

        let value = dispatcher
            .execute(
                "shop",
                &CommandDescriptor::new("object", vec![json!("encoding"), json!("k")]),
            )
            .await
            .unwrap();
        assert_eq!(value, json!("listpack"));
        assert_eq!(backend.sent(), vec![vec!["OBJECT", "encoding", "k"]]);
    }

    #[tokio::test]
    async fn test_raw_label_is_logged_without_marker() {
        let backend = ScriptedBackend::new();
        let (dispatcher, settings) = bridge_parts(&backend, &[]);
        settings.set(UI, "true");

        dispatcher
            .execute("shop", &CommandDescriptor::raw("ping", vec![]))
            .await
            .unwrap();

        let entries = dispatcher.profiler().log().entries("shop").unwrap();
        assert_eq!(entries[0].command, "ping");
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_returned() {
        let backend = ScriptedBackend::new();
        backend.reply("INCR", RespValue::error("ERR value is not an integer"));
        let (dispatcher, settings) = bridge_parts(&backend, &[]);
        settings.set(UI, "true");
        let mut failures = dispatcher.profiler().subscribe();

        let err = dispatcher
            .execute("shop", &CommandDescriptor::new("incr", vec![json!("name")]))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Backend(BackendError::Reply(_))));
        assert_eq!(failures.try_recv().unwrap().command, "incr");
        assert_eq!(dispatcher.profiler().log().len("shop"), 1);
    }

    #[tokio::test]
    async fn test_batch_is_one_transaction_and_one_entry() {
        let backend = ScriptedBackend::new();
        backend.reply("SET", RespValue::ok());
        backend.reply("GET", RespValue::bulk_string("v"));
        let (dispatcher, settings) = bridge_parts(&backend, &[]);
        settings.set(UI, "true");

        let batch = vec![
            CommandDescriptor::new("set", vec![json!("k"), json!("v")]),
            CommandDescriptor::new("get", vec![json!("k")]),
        ];
        let results = dispatcher.execute_batch("shop", &batch).await.unwrap();

        assert_eq!(results, vec![json!("OK"), json!("v")]);
        assert_eq!(backend.transactions(), 1);
        let entries = dispatcher.profiler().log().entries("shop").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].command, MULTI_EXEC_LABEL);
        assert_eq!(entries[0].args[1], json!({"command": "get", "args": ["k"]}));
    }

    #[tokio::test]
    async fn test_batch_with_unnamed_entry_sends_nothing() {
        let backend = ScriptedBackend::new();
        let (dispatcher, _) = bridge_parts(&backend, &[]);

        let batch = vec![
            CommandDescriptor::new("get", vec![json!("k")]),
            CommandDescriptor::new("", vec![]),
        ];
        let err = dispatcher.execute_batch("shop", &batch).await.unwrap_err();
        assert!(matches!(err, BridgeError::Validation(ref m) if m.contains("index 1")));
        assert_eq!(backend.transactions(), 0);
        assert!(backend.sent().is_empty());
    }

    #[tokio::test]
    async fn test_batch_element_error_fails_commit() {
        let backend = ScriptedBackend::new();
        backend.reply("INCR", RespValue::error("ERR value is not an integer"));
        let (dispatcher, _) = bridge_parts(&backend, &[]);

        let batch = vec![CommandDescriptor::new("incr", vec![json!("name")])];
        let err = dispatcher.execute_batch("shop", &batch).await.unwrap_err();
        assert!(err.to_string().contains("not an integer"));
    }
}
