//! Result Delivery
//!
//! Every call produces one `Result<Value, BridgeError>`. Two adapters hand
//! it back to the caller:
//!
//! - **callback**: the call runs on its own task and the callback receives
//!   `(Some(value), None)` or `(None, Some(message))`. The calling frame never
//!   sees an error.
//! - **async**: the caller awaits the `Result` directly and no callback is
//!   involved.

use crate::error::{BridgeError, Result};
use crate::profiler::clean_message;
use serde_json::Value;
use std::future::Future;
use tokio::task::JoinHandle;

/// Completion callback for the legacy calling convention.
pub trait Callback: FnOnce(Option<Value>, Option<String>) + Send + 'static {}

impl<F> Callback for F where F: FnOnce(Option<Value>, Option<String>) + Send + 'static {}

/// Runs `call` in the background and reports its outcome to `callback`.
pub fn with_callback<F>(call: F, callback: impl Callback) -> JoinHandle<()>
where
    F: Future<Output = Result<Value>> + Send + 'static,
{
    tokio::spawn(async move {
        match call.await {
            Ok(value) => callback(Some(value), None),
            Err(e) => callback(None, Some(failure_message(&e))),
        }
    })
}

/// Message handed to callbacks on failure.
pub fn failure_message(err: &BridgeError) -> String {
    clean_message(&err.to_string())
}
