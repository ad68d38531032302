//! Configuration
//!
//! - `options`: backend connection strings
//! - `settings`: polled instrumentation settings (debug, slow-query
//!   threshold, log retention)

pub mod options;
pub mod settings;

pub use options::{ConnectionOptions, DEFAULT_HOST, DEFAULT_PORT};
pub use settings::{DebugMode, Settings, SettingsStore};
