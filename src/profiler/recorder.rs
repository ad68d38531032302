//! Command Profiler
//!
//! Every dispatch ends here with its caller, command, arguments and
//! latency. Two independent decisions are made on each record, both against
//! settings read at that moment:
//!
//! 1. Console line: when the command was slow, or debug mode covers the
//!    caller.
//! 2. Retained entry: only when the dashboard (`redis_ui`) is enabled.
//!
//! Failures take an extra path: the message is cleaned up, published to
//! failure subscribers, and handed to the structured log sink.

use crate::config::SettingsStore;
use crate::error::BridgeError;
use crate::profiler::storage::{CommandLog, CommandLogEntry};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

lazy_static::lazy_static! {
    /// Location prefix the host runtime puts in front of script errors.
    static ref SCRIPT_ERROR_PREFIX: Option<Regex> =
        Regex::new(r"SCRIPT ERROR: citizen:[\w/.]+:\d+[:\s]+").ok();
}

const FAILURE_CHANNEL_CAPACITY: usize = 256;

/// One finished dispatch.
#[derive(Debug, Clone, Copy)]
pub struct Sample<'a> {
    pub caller: &'a str,
    pub command: &'a str,
    pub args: &'a [Value],
    pub latency_ms: f64,
}

/// What `record` decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordOutcome {
    pub slow: bool,
    pub emitted: bool,
    pub retained: bool,
}

/// Published for every failed command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFailure {
    pub command: String,
    pub args: Vec<Value>,
    pub message: String,
    pub raw_error: String,
    #[serde(rename = "resource")]
    pub caller: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// A structured record for an external logging service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub level: LogLevel,
    #[serde(rename = "resource")]
    pub caller: String,
    pub message: String,
    pub metadata: Value,
}

/// Destination for structured failure records.
pub trait LogSink: Send + Sync {
    fn log(&self, record: &LogRecord);
}

/// Default sink: structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, record: &LogRecord) {
        match record.level {
            LogLevel::Info => info!(caller = %record.caller, metadata = %record.metadata, "{}", record.message),
            LogLevel::Warn => warn!(caller = %record.caller, metadata = %record.metadata, "{}", record.message),
            LogLevel::Error => error!(caller = %record.caller, metadata = %record.metadata, "{}", record.message),
        }
    }
}

pub struct Profiler {
    settings: Arc<SettingsStore>,
    log: CommandLog,
    failures: broadcast::Sender<CommandFailure>,
    sink: Arc<dyn LogSink>,
}

impl Profiler {
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self::with_sink(settings, Arc::new(TracingSink))
    }

    pub fn with_sink(settings: Arc<SettingsStore>, sink: Arc<dyn LogSink>) -> Self {
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        Self {
            settings,
            log: CommandLog::new(),
            failures,
            sink,
        }
    }

    pub fn log(&self) -> &CommandLog {
        &self.log
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Receives every [`CommandFailure`] published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CommandFailure> {
        self.failures.subscribe()
    }

    /// Records a finished command.
    pub fn record(&self, sample: Sample<'_>) -> RecordOutcome {
        let settings = self.settings.settings();
        let slow = sample.latency_ms >= settings.slow_query_warning_ms as f64;
        let emitted = slow || settings.debug.includes(sample.caller);

        if emitted {
            let args = format_args_suffix(sample.args);
            if slow {
                warn!(
                    caller = %sample.caller,
                    latency_ms = sample.latency_ms,
                    "{} took {:.4}ms to execute a command!\n{}{}",
                    sample.caller, sample.latency_ms, sample.command, args
                );
            } else {
                info!(
                    caller = %sample.caller,
                    latency_ms = sample.latency_ms,
                    "{} took {:.4}ms to execute a command!\n{}{}",
                    sample.caller, sample.latency_ms, sample.command, args
                );
            }
        }

        if settings.ui {
            self.log.push(
                sample.caller,
                CommandLogEntry {
                    command: sample.command.to_string(),
                    args: sample.args.to_vec(),
                    execution_time_ms: sample.latency_ms,
                    timestamp_ms: now_ms(),
                    slow,
                },
                settings.log_size,
            );
        }

        RecordOutcome {
            slow,
            emitted,
            retained: settings.ui,
        }
    }

    /// Records a failed command and returns the operator-facing message.
    pub fn record_error(&self, sample: Sample<'_>, err: &BridgeError) -> String {
        self.record(sample);

        let raw_error = err.to_string();
        let message = clean_message(&raw_error);
        let output = format!(
            "{} was unable to execute a Redis command!\nCommand: {}{}\n{}",
            sample.caller,
            sample.command,
            format_args_suffix(sample.args),
            message
        );

        // No subscribers is fine.
        let _ = self.failures.send(CommandFailure {
            command: sample.command.to_string(),
            args: sample.args.to_vec(),
            message: message.clone(),
            raw_error: raw_error.clone(),
            caller: sample.caller.to_string(),
        });

        self.sink.log(&LogRecord {
            level: LogLevel::Error,
            caller: sample.caller.to_string(),
            message,
            metadata: Value::String(raw_error),
        });

        error!(caller = %sample.caller, "{}", output);
        output
    }
}

/// Strips the host's script location prefix from an error message.
pub fn clean_message(raw: &str) -> String {
    match SCRIPT_ERROR_PREFIX.as_ref() {
        Some(re) => re.replace(raw, "").into_owned(),
        None => raw.to_string(),
    }
}

fn format_args_suffix(args: &[Value]) -> String {
    if args.is_empty() {
        String::new()
    } else {
        format!(" {}", Value::Array(args.to_vec()))
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
