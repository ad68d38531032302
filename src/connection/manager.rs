//! Shared Connection Lifecycle
//!
//! The bridge owns exactly one backend connection for the whole process.
//! It starts out unset; a background task keeps trying to create it and
//! publishes it once, after which it is never replaced or torn down.
//!
//! Callers that arrive early park on a `watch` channel and are woken
//! exactly when the handle is published. Nobody polls.
//!
//! ```text
//!   start() ──> read connection string ──> connect + PING + INFO
//!                      ▲                          │
//!                      │ sleep(retry_delay)   ok? ├── yes ──> publish ──> done
//!                      └──────────────────────────┘
//!                                 no (log, redacted)
//! ```

use crate::config::{ConnectionOptions, SettingsStore};
use crate::connection::handler::{Backend, Connected, Connector};
use crate::error::{BackendError, BridgeError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Settings for the connection loop.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Delay between failed connection attempts (default: 30s)
    pub retry_delay: Duration,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(30),
        }
    }
}

/// The published connection.
#[derive(Clone)]
pub struct Handle {
    backend: Arc<dyn Backend>,
    version: Arc<str>,
}

impl Handle {
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// e.g. `[Redis 7.2.4]`
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Owns the process-wide connection slot.
pub struct ConnectionManager {
    slot: watch::Sender<Option<Handle>>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot }
    }

    /// Returns the handle if it exists, without waiting.
    pub fn try_acquire(&self) -> Result<Handle, BridgeError> {
        self.slot
            .borrow()
            .clone()
            .ok_or(BridgeError::ConnectionUnavailable)
    }

    pub fn is_ready(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Diagnostic version string, empty until connected.
    pub fn version(&self) -> String {
        self.slot
            .borrow()
            .as_ref()
            .map(|h| h.version.to_string())
            .unwrap_or_default()
    }

    /// Suspends until the connection is published.
    pub async fn wait_until_ready(&self) -> Handle {
        let mut rx = self.slot.subscribe();
        loop {
            if let Some(handle) = rx.borrow_and_update().clone() {
                return handle;
            }
            // The sender lives in `self`, so this only fails if the manager is
            // being torn down underneath us.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Publishes a connection. Only the first publish wins; returns whether
    /// this call set the slot.
    pub fn publish(&self, connected: Connected) -> bool {
        let handle = Handle {
            backend: connected.backend,
            version: Arc::from(connected.version),
        };
        self.slot.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(handle);
            true
        })
    }

    /// One connection attempt. Failures are logged with the password
    /// redacted and returned.
    pub async fn create(
        &self,
        connector: &dyn Connector,
        options: &ConnectionOptions,
    ) -> Result<(), BackendError> {
        match connector.connect(options).await {
            Ok(connected) => {
                let version = connected.version.clone();
                if self.publish(connected) {
                    info!("{} Redis server connection established!", version);
                }
                Ok(())
            }
            Err(e) => {
                error!(
                    error = %e,
                    config = ?options,
                    "Unable to establish a connection to Redis!"
                );
                Err(e)
            }
        }
    }

    /// Spawns the connect-until-ready loop. The connection string is re-read
    /// on every attempt so a corrected setting is picked up without a
    /// restart.
    pub fn start(
        self: &Arc<Self>,
        connector: Arc<dyn Connector>,
        settings: Arc<SettingsStore>,
        config: ConnectConfig,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            while !manager.is_ready() {
                match settings.connection_string() {
                    Some(raw) => match ConnectionOptions::parse(&raw) {
                        Ok(options) => {
                            let _ = manager.create(connector.as_ref(), &options).await;
                        }
                        Err(e) => error!(error = %e, "Invalid redis_connection_string"),
                    },
                    None => error!("redis_connection_string is not set"),
                }

                if !manager.is_ready() {
                    tokio::time::sleep(config.retry_delay).await;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::CONNECTION_STRING;
    use crate::protocol::RespValue;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullBackend;

    #[async_trait]
    impl Backend for NullBackend {
        async fn call(&self, _frame: Vec<Bytes>) -> Result<RespValue, BackendError> {
            Ok(RespValue::ok())
        }

        async fn transaction(
            &self,
            _frames: Vec<Vec<Bytes>>,
        ) -> Result<Vec<RespValue>, BackendError> {
            Ok(vec![])
        }
    }

    /// Fails the first `failures` attempts, then succeeds.
    struct FlakyConnector {
        failures: usize,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Connector for FlakyConnector {
        async fn connect(&self, _options: &ConnectionOptions) -> Result<Connected, BackendError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(BackendError::Closed);
            }
            Ok(Connected {
                backend: Arc::new(NullBackend),
                version: "[Redis 7.0.0]".to_string(),
            })
        }
    }

    fn connected() -> Connected {
        Connected {
            backend: Arc::new(NullBackend),
            version: "[Redis]".to_string(),
        }
    }

    #[tokio::test]
    async fn test_waiters_wake_on_publish() {
        let manager = Arc::new(ConnectionManager::new());
        assert!(matches!(
            manager.try_acquire(),
            Err(BridgeError::ConnectionUnavailable)
        ));

        let waiter = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.wait_until_ready().await.version().to_string() })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        assert!(manager.publish(connected()));
        assert_eq!(waiter.await.unwrap(), "[Redis]");
        assert!(manager.is_ready());
    }

    #[test]
    fn test_wait_is_pending_until_publish() {
        let manager = ConnectionManager::new();
        let mut wait = tokio_test::task::spawn(manager.wait_until_ready());
        tokio_test::assert_pending!(wait.poll());

        manager.publish(connected());
        assert!(wait.is_woken());
        let handle = tokio_test::assert_ready!(wait.poll());
        assert_eq!(handle.version(), "[Redis]");
        assert_eq!(format!("{:?}", handle), r#"Handle { version: "[Redis]", .. }"#);
        assert!(manager.try_acquire().is_ok());
    }

    #[tokio::test]
    async fn test_publish_happens_once() {
        let manager = ConnectionManager::new();
        assert!(manager.publish(connected()));
        assert!(!manager.publish(Connected {
            backend: Arc::new(NullBackend),
            version: "[Redis other]".to_string(),
        }));
        assert_eq!(manager.version(), "[Redis]");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_after_delay() {
        let manager = Arc::new(ConnectionManager::new());
        let connector = Arc::new(FlakyConnector {
            failures: 2,
            attempts: AtomicUsize::new(0),
        });
        let settings =
            Arc::new(SettingsStore::isolated().with(CONNECTION_STRING, "redis://localhost"));

        let task = manager.start(
            connector.clone(),
            settings,
            ConnectConfig {
                retry_delay: Duration::from_secs(30),
            },
        );

        let handle = manager.wait_until_ready().await;
        assert_eq!(handle.version(), "[Redis 7.0.0]");
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_connection_string_keeps_waiting() {
        let manager = Arc::new(ConnectionManager::new());
        let connector = Arc::new(FlakyConnector {
            failures: 0,
            attempts: AtomicUsize::new(0),
        });
        let settings = Arc::new(SettingsStore::isolated());

        let _task = manager.start(connector.clone(), settings.clone(), ConnectConfig::default());
        tokio::time::sleep(Duration::from_secs(65)).await;
        assert!(!manager.is_ready());
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);

        settings.set(CONNECTION_STRING, "host=localhost");
        manager.wait_until_ready().await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }
}
