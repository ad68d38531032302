//! Transaction Session
//!
//! A per-caller queue that turns ordinary command calls into one atomic
//! batch.
//!
//! ```text
//!            begin()                      commit()
//!   Idle ───────────────> Open ────────────────────────> Idle
//!    ▲                    │  ▲          (one MULTI/EXEC)
//!    │      discard()     │  │ execute() queues,
//!    └────────────────────┘  │ returns "QUEUED"
//!                            └─┘
//! ```
//!
//! While open, nothing reaches the backend and nothing is logged per
//! command. `begin()` while already open is rejected.

use crate::bridge::Dispatcher;
use crate::commands::CommandDescriptor;
use crate::error::{BridgeError, Result};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Result of a call made through a session.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Value(Value),
    /// The command was queued for the next commit.
    Queued,
}

impl Reply {
    /// Flattens to a plain value; a queued command reads as `"QUEUED"`.
    pub fn into_value(self) -> Value {
        match self {
            Reply::Value(value) => value,
            Reply::Queued => Value::String("QUEUED".to_string()),
        }
    }
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    Open(Vec<CommandDescriptor>),
}

pub struct Session {
    caller: Arc<str>,
    dispatcher: Arc<Dispatcher>,
    state: Mutex<State>,
}

impl Session {
    pub fn new(caller: Arc<str>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            caller,
            dispatcher,
            state: Mutex::new(State::Idle),
        }
    }

    pub fn caller(&self) -> &str {
        &self.caller
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.state(), State::Open(_))
    }

    /// Opens a transaction.
    pub fn begin(&self) -> Result<()> {
        let mut state = self.state();
        if matches!(*state, State::Open(_)) {
            return Err(BridgeError::protocol("begin while a transaction is open"));
        }
        *state = State::Open(Vec::new());
        Ok(())
    }

    /// Appends to the open transaction.
    pub fn queue(&self, descriptor: CommandDescriptor) -> Result<Reply> {
        match &mut *self.state() {
            State::Open(queue) => {
                queue.push(descriptor);
                Ok(Reply::Queued)
            }
            State::Idle => Err(BridgeError::protocol("queue without begin")),
        }
    }

    /// Queues `descriptor` if a transaction is open. Otherwise hands it
    /// back for immediate dispatch.
    pub fn try_queue(&self, descriptor: CommandDescriptor) -> Option<CommandDescriptor> {
        match &mut *self.state() {
            State::Open(queue) => {
                queue.push(descriptor);
                None
            }
            State::Idle => Some(descriptor),
        }
    }

    /// Runs a command now, or queues it if a transaction is open.
    pub async fn execute(&self, descriptor: CommandDescriptor) -> Result<Reply> {
        match self.try_queue(descriptor) {
            Some(descriptor) => self.run(descriptor).await.map(Reply::Value),
            None => Ok(Reply::Queued),
        }
    }

    /// Dispatches immediately, ignoring any open transaction.
    pub async fn run(&self, descriptor: CommandDescriptor) -> Result<Value> {
        self.dispatcher.execute(&self.caller, &descriptor).await
    }

    /// Sends the queued commands as one atomic batch and returns their
    /// results in queue order. The session is idle afterwards, whether or
    /// not the batch succeeded.
    pub async fn commit(&self) -> Result<Vec<Value>> {
        let queue = match std::mem::take(&mut *self.state()) {
            State::Open(queue) => queue,
            State::Idle => return Err(BridgeError::protocol("commit without begin")),
        };

        self.dispatcher.execute_batch(&self.caller, &queue).await
    }

    /// Drops the queued commands without contacting the backend.
    pub fn discard(&self) -> Result<()> {
        let queue = match std::mem::take(&mut *self.state()) {
            State::Open(queue) => queue,
            State::Idle => return Err(BridgeError::protocol("discard without begin")),
        };

        self.dispatcher.record_discard(&self.caller, &queue);
        Ok(())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::{bridge_parts, ScriptedBackend};
    use crate::protocol::RespValue;
    use serde_json::json;

    fn session(backend: &ScriptedBackend) -> Session {
        let (dispatcher, _) = bridge_parts(backend, &[("redis_ui", "true")]);
        Session::new(Arc::from("shop"), dispatcher)
    }

    #[tokio::test]
    async fn test_commit_runs_queue_in_order() {
        let backend = ScriptedBackend::new();
        backend.reply("INCR", RespValue::integer(1));
        backend.reply("GET", RespValue::bulk_string("1"));
        let session = session(&backend);

        session.begin().unwrap();
        let a = session
            .execute(CommandDescriptor::new("incr", vec![json!("n")]))
            .await
            .unwrap();
        let b = session
            .execute(CommandDescriptor::new("get", vec![json!("n")]))
            .await
            .unwrap();
        assert_eq!(a, Reply::Queued);
        assert_eq!(b.into_value(), json!("QUEUED"));
        assert!(backend.sent().is_empty());

        let results = session.commit().await.unwrap();
        assert_eq!(results, vec![json!(1), json!("1")]);
        assert_eq!(backend.transactions(), 1);
        assert_eq!(backend.sent(), vec![vec!["INCR", "n"], vec!["GET", "n"]]);
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn test_discard_sends_nothing() {
        let backend = ScriptedBackend::new();
        let session = session(&backend);

        session.begin().unwrap();
        session
            .queue(CommandDescriptor::new("set", vec![json!("k"), json!("v")]))
            .unwrap();
        session.discard().unwrap();

        assert!(!session.is_open());
        assert!(backend.sent().is_empty());
        assert_eq!(backend.transactions(), 0);
    }

    #[tokio::test]
    async fn test_commit_without_begin() {
        let backend = ScriptedBackend::new();
        let session = session(&backend);

        let err = session.commit().await.unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(ref m) if m == "commit without begin"));
        assert_eq!(backend.transactions(), 0);
    }

    #[tokio::test]
    async fn test_nested_begin_is_rejected() {
        let backend = ScriptedBackend::new();
        let session = session(&backend);

        session.begin().unwrap();
        session
            .queue(CommandDescriptor::new("get", vec![json!("k")]))
            .unwrap();
        assert!(matches!(session.begin(), Err(BridgeError::Protocol(_))));

        // The original transaction is untouched.
        assert_eq!(session.commit().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_try_queue_only_while_open() {
        let backend = ScriptedBackend::new();
        let session = session(&backend);

        let get = CommandDescriptor::new("get", vec![json!("k")]);
        assert_eq!(session.try_queue(get.clone()), Some(get.clone()));

        session.begin().unwrap();
        assert_eq!(session.try_queue(get), None);
        assert_eq!(session.commit().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_idle_session_executes_immediately() {
        let backend = ScriptedBackend::new();
        backend.reply("GET", RespValue::bulk_string("v"));
        let session = session(&backend);

        let reply = session
            .execute(CommandDescriptor::new("get", vec![json!("k")]))
            .await
            .unwrap();
        assert_eq!(reply, Reply::Value(json!("v")));
        assert!(matches!(
            session.queue(CommandDescriptor::new("get", vec![])),
            Err(BridgeError::Protocol(_))
        ));
        assert!(matches!(session.discard(), Err(BridgeError::Protocol(_))));
    }
}
