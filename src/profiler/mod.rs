//! Instrumentation
//!
//! Latency tracking for every dispatched command.
//!
//! - [`recorder`]: decides whether a command is logged to the console and
//!   whether it is retained, and publishes failures
//! - [`storage`]: bounded per-caller command buffers
//! - [`telemetry`]: dashboard snapshots over the retained buffers

pub mod recorder;
pub mod storage;
pub mod telemetry;

pub use recorder::{
    clean_message, CommandFailure, LogLevel, LogRecord, LogSink, Profiler, RecordOutcome, Sample,
    TracingSink,
};
pub use storage::{CommandLog, CommandLogEntry};
pub use telemetry::{fetch_resource, overview, Overview, ResourcePage, ResourceQuery, SortField, SortKey};
