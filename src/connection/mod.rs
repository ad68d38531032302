//! Backend Connection Module
//!
//! The bridge talks to the backend over exactly one connection, shared by
//! every caller in the process.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ConnectionManager                        │
//! │                                                             │
//! │   start() ──> retry loop ──> Connector::connect()           │
//! │                                     │                       │
//! │                                     ▼                       │
//! │                          publish Handle (once)              │
//! └──────────────────────────────┬──────────────────────────────┘
//!                                │ wait_until_ready()
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Backend (RespConnection)                    │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Write frame │───>│ Read bytes  │───>│ Parse RESP  │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Wait, don't fail**: callers park until the connection exists
//! - **Buffer Management**: `BytesMut` read buffer, grown on demand
//! - **Transparent reconnect**: a broken socket is reopened on the next call

pub mod handler;
pub mod manager;

// Re-export commonly used types
pub use handler::{
    Backend, Connected, ConnectionStats, Connector, RespConnection, StatsSnapshot, TcpConnector,
};
pub use manager::{ConnectConfig, ConnectionManager, Handle};
