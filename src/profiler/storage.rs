//! Per-Caller Command Log
//!
//! Each caller gets its own bounded buffer of recent commands. The buffers
//! are shared by every task in the process, so the map sits behind a
//! mutex; a push is a single short critical section.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ CommandLog                                   │
//! │   "inventory" ─> [e1, e2, ... eN]  (≤ cap)   │
//! │   "banking"   ─> [e1, e2]                    │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! When a buffer is full the oldest entry is dropped. The capacity is passed
//! on every push because it is a live setting; shrinking it trims the
//! buffer on the next push.

use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One recorded command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandLogEntry {
    pub command: String,
    pub args: Vec<Value>,
    #[serde(rename = "executionTime")]
    pub execution_time_ms: f64,
    #[serde(rename = "date")]
    pub timestamp_ms: i64,
    pub slow: bool,
}

/// Bounded per-caller buffers.
#[derive(Debug, Default)]
pub struct CommandLog {
    buffers: Mutex<HashMap<String, VecDeque<CommandLogEntry>>>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry, evicting from the front until at most `capacity`
    /// entries remain.
    pub fn push(&self, caller: &str, entry: CommandLogEntry, capacity: usize) {
        let mut buffers = self.buffers();
        let buffer = buffers.entry(caller.to_string()).or_default();
        buffer.push_back(entry);
        while buffer.len() > capacity {
            buffer.pop_front();
        }
    }

    /// Copy of one caller's buffer, oldest first.
    pub fn entries(&self, caller: &str) -> Option<Vec<CommandLogEntry>> {
        self.buffers()
            .get(caller)
            .map(|b| b.iter().cloned().collect())
    }

    /// Copy of every buffer, callers in name order.
    pub fn snapshot(&self) -> Vec<(String, Vec<CommandLogEntry>)> {
        let mut all: Vec<_> = self
            .buffers()
            .iter()
            .map(|(caller, b)| (caller.clone(), b.iter().cloned().collect()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn len(&self, caller: &str) -> usize {
        self.buffers().get(caller).map_or(0, VecDeque::len)
    }

    fn buffers(&self) -> MutexGuard<'_, HashMap<String, VecDeque<CommandLogEntry>>> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
