//! In-process backend for bridge tests.

use crate::bridge::Dispatcher;
use crate::commands::CommandTable;
use crate::config::SettingsStore;
use crate::connection::{Backend, Connected, ConnectionManager, ConnectionStats};
use crate::error::BackendError;
use crate::profiler::Profiler;
use crate::protocol::RespValue;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Script {
    replies: HashMap<String, RespValue>,
    sent: Vec<Vec<String>>,
    transactions: usize,
}

/// Answers by command name; anything unscripted gets `+OK`.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
    stats: Option<Arc<ConnectionStats>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that also keeps traffic counters.
    pub fn counting() -> Self {
        Self {
            stats: Some(Arc::new(ConnectionStats::new())),
            ..Self::default()
        }
    }

    pub fn reply(&self, command: &str, value: RespValue) {
        self.script
            .lock()
            .unwrap()
            .replies
            .insert(command.to_string(), value);
    }

    /// Every frame received, in order, including those inside transactions.
    pub fn sent(&self) -> Vec<Vec<String>> {
        self.script.lock().unwrap().sent.clone()
    }

    pub fn transactions(&self) -> usize {
        self.script.lock().unwrap().transactions
    }

    fn answer(&self, frame: &[Bytes]) -> RespValue {
        let parts: Vec<String> = frame
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect();
        let mut script = self.script.lock().unwrap();
        let reply = parts
            .first()
            .and_then(|name| script.replies.get(name).cloned())
            .unwrap_or_else(RespValue::ok);
        script.sent.push(parts);
        if let Some(stats) = &self.stats {
            stats.commands_sent(1);
        }
        reply
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn call(&self, frame: Vec<Bytes>) -> Result<RespValue, BackendError> {
        match self.answer(&frame) {
            RespValue::Error(msg) => Err(BackendError::Reply(msg)),
            other => Ok(other),
        }
    }

    async fn transaction(&self, frames: Vec<Vec<Bytes>>) -> Result<Vec<RespValue>, BackendError> {
        self.script.lock().unwrap().transactions += 1;
        Ok(frames.iter().map(|frame| self.answer(frame)).collect())
    }

    fn stats(&self) -> Option<Arc<ConnectionStats>> {
        self.stats.clone()
    }
}

/// A dispatcher already connected to `backend`, plus its settings.
pub fn bridge_parts(
    backend: &ScriptedBackend,
    settings: &[(&str, &str)],
) -> (Arc<Dispatcher>, Arc<SettingsStore>) {
    let store = settings
        .iter()
        .fold(SettingsStore::isolated(), |store, (k, v)| store.with(k, *v));
    let settings = Arc::new(store);

    let connection = Arc::new(ConnectionManager::new());
    connection.publish(Connected {
        backend: Arc::new(backend.clone()),
        version: "[Redis test]".to_string(),
    });

    let dispatcher = Arc::new(Dispatcher::new(
        connection,
        Arc::new(CommandTable::new()),
        Arc::new(Profiler::new(Arc::clone(&settings))),
    ));
    (dispatcher, settings)
}
