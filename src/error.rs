//! Error types shared across the bridge.

use crate::protocol::ParseError;
use thiserror::Error;

/// Failures reported by the backend driver.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// The backend answered with an error reply.
    #[error("{0}")]
    Reply(String),

    /// The driver refused the arguments before anything was sent.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// EXEC returned a null reply (a watched key changed).
    #[error("Transaction aborted by the server")]
    Aborted,

    #[error("Connection closed by the server")]
    Closed,

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    /// A reply outgrew the read buffer; the connection was dropped.
    #[error("Reply exceeds {limit} buffered bytes")]
    ReplyTooLarge { limit: usize },
}

/// The error taxonomy every bridge call resolves to.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No shared connection exists yet. Dispatch waits instead of returning
    /// this; only [`ConnectionManager::try_acquire`] reports it.
    ///
    /// [`ConnectionManager::try_acquire`]: crate::connection::ConnectionManager::try_acquire
    #[error("Connection to the backend is not available")]
    ConnectionUnavailable,

    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The transaction state machine was misused.
    #[error("{0}")]
    Protocol(String),

    /// A transaction batch entry was malformed.
    #[error("{0}")]
    Validation(String),
}

impl BridgeError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        BridgeError::Protocol(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        BridgeError::Validation(msg.into())
    }
}

/// Invalid connection string or settings.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("invalid connection url: {0}")]
    InvalidUrl(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, BridgeError>;
