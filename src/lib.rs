//! # redisbridge - Shared Redis Command Bridge
//!
//! redisbridge lets many independent calling modules share one Redis
//! connection. Each caller gets a [`Resource`] handle; every command it runs
//! is resolved through a closed command table, timed, and recorded against
//! the caller's name.
//!
//! ## Features
//!
//! - **One connection**: established in the background, retried every 30s,
//!   shared by everyone; callers wait instead of failing
//! - **Typed or raw**: known commands get argument validation and reply
//!   shaping, anything else is sent verbatim
//! - **Transactions**: a per-caller queue committed as one MULTI/EXEC
//! - **Profiling**: slow-query warnings, per-caller debug logging and
//!   bounded per-caller logs for a dashboard
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Bridge                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │  Resource   │───>│  Session    │───>│ Dispatcher  │                  │
//! │  │ (per caller)│    │ (MULTI queue│    │             │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                     ┌─────────────────────────┼───────────────────────┐ │
//! │                     ▼                         ▼                       ▼ │
//! │  ┌──────────────────────┐   ┌─────────────────────────┐  ┌────────────┐ │
//! │  │    CommandTable      │   │   ConnectionManager     │  │  Profiler  │ │
//! │  │ typed encoders + raw │   │ watch slot ─> Backend   │  │ CommandLog │ │
//! │  └──────────────────────┘   └─────────────────────────┘  └────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use redisbridge::{Bridge, SettingsStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Reads REDIS_CONNECTION_STRING, REDIS_DEBUG, ... from the environment
//!     let bridge = Bridge::new(Arc::new(SettingsStore::from_env()));
//!     let _connect = bridge.start();
//!
//!     let shop = bridge.resource("shop");
//!     shop.set_async("stock:apples", 12, None).await?;
//!     let stock = shop.get_async("stock:apples").await?;
//!
//!     // Legacy callback style: never returns an error to the caller
//!     shop.incr("visits", |value, err| println!("{:?} {:?}", value, err));
//!
//!     // Transactions
//!     shop.session().begin()?;
//!     shop.incr_async("orders").await?; // "QUEUED"
//!     shop.decrby_async("stock:apples", 1).await?; // "QUEUED"
//!     let results = shop.session().commit().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Settings
//!
//! | Key                        | Meaning                                       |
//! |----------------------------|-----------------------------------------------|
//! | `redis_connection_string`  | URL or `key=value;...` form                   |
//! | `redis_ui`                 | retain per-caller logs for the dashboard      |
//! | `redis_slow_query_warning` | slow threshold in ms (default 200)            |
//! | `redis_debug`              | `true`, `false` or a JSON list of callers     |
//! | `redis_log_size`           | per-caller log capacity (10000 while debug)   |
//!
//! Settings are read on every use, so changes apply to the next command.
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP protocol parser and types
//! - [`config`]: Connection strings and live settings
//! - [`connection`]: Backend driver and the shared connection slot
//! - [`commands`]: Descriptors and the typed command table
//! - [`profiler`]: Latency recording and dashboard snapshots
//! - [`bridge`]: Dispatch, transactions and result delivery
//! - [`exports`]: The per-caller command surface

pub mod bridge;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod exports;
pub mod profiler;
pub mod protocol;

// Re-export commonly used types for convenience
pub use bridge::{Bridge, Dispatcher, Reply, Session};
pub use commands::{CommandDescriptor, CommandTable};
pub use config::{ConnectionOptions, DebugMode, SettingsStore};
pub use connection::{ConnectConfig, ConnectionManager, TcpConnector};
pub use error::{BackendError, BridgeError, ConfigError};
pub use exports::{resolve_export, Resource};
pub use profiler::{CommandFailure, Profiler};
pub use protocol::{ParseError, RespParser, RespValue};

/// Version of redisbridge
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
