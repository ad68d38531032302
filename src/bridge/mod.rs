//! Command Execution Bridge
//!
//! Wires the pieces together:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │ Bridge                                                         │
//! │                                                                │
//! │  resource("shop") ──> Resource ──> Session ──> Dispatcher ──┐  │
//! │  resource("bank") ──> Resource ──> Session ──┘              │  │
//! │                                                             ▼  │
//! │            Profiler <── record ── ConnectionManager ─> Backend │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every caller shares the dispatcher, the connection and the profiler;
//! each [`Resource`] has its own transaction session.

pub mod delivery;
pub mod dispatcher;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use delivery::{failure_message, with_callback, Callback};
pub use dispatcher::{Dispatcher, MULTI_EXEC_LABEL};
pub use session::{Reply, Session};

use crate::commands::CommandTable;
use crate::config::SettingsStore;
use crate::connection::{ConnectConfig, ConnectionManager, Connector, StatsSnapshot, TcpConnector};
use crate::exports::Resource;
use crate::profiler::{
    self, CommandFailure, LogSink, Overview, Profiler, ResourcePage, ResourceQuery, TracingSink,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// The process-wide bridge.
pub struct Bridge {
    settings: Arc<SettingsStore>,
    dispatcher: Arc<Dispatcher>,
}

impl Bridge {
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self::with_sink(settings, Arc::new(TracingSink))
    }

    /// A bridge whose failure records go to `sink`.
    pub fn with_sink(settings: Arc<SettingsStore>, sink: Arc<dyn LogSink>) -> Self {
        let profiler = Arc::new(Profiler::with_sink(Arc::clone(&settings), sink));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(ConnectionManager::new()),
            Arc::new(CommandTable::new()),
            profiler,
        ));
        Self {
            settings,
            dispatcher,
        }
    }

    /// Starts the connection loop with the TCP connector.
    pub fn start(&self) -> JoinHandle<()> {
        self.start_with(Arc::new(TcpConnector), ConnectConfig::default())
    }

    pub fn start_with(&self, connector: Arc<dyn Connector>, config: ConnectConfig) -> JoinHandle<()> {
        self.connection()
            .start(connector, Arc::clone(&self.settings), config)
    }

    /// The command surface for one caller.
    pub fn resource(&self, caller: impl Into<String>) -> Resource {
        Resource::new(Arc::from(caller.into()), Arc::clone(&self.dispatcher))
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        self.dispatcher.connection()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn subscribe_failures(&self) -> broadcast::Receiver<CommandFailure> {
        self.dispatcher.profiler().subscribe()
    }

    /// Traffic counters of the shared connection. `None` until connected, or
    /// when the backend keeps no counters.
    pub fn connection_stats(&self) -> Option<StatsSnapshot> {
        let handle = self.connection().try_acquire().ok()?;
        handle.backend().stats().map(|stats| stats.snapshot())
    }

    /// Dashboard totals. Empty while `redis_ui` is off.
    pub fn overview(&self) -> Overview {
        if !self.settings.settings().ui {
            return Overview::default();
        }
        profiler::overview(self.dispatcher.profiler().log())
    }

    /// One page of a caller's log. `None` while `redis_ui` is off or for a
    /// caller with no entries.
    pub fn fetch_resource(&self, query: &ResourceQuery) -> Option<ResourcePage> {
        if !self.settings.settings().ui {
            return None;
        }
        profiler::fetch_resource(self.dispatcher.profiler().log(), query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::UI;
    use crate::connection::{Backend, Connected};
    use crate::protocol::RespValue;
    use serde_json::json;
    use super::testing::ScriptedBackend;

    fn connected_bridge(settings: SettingsStore, backend: &ScriptedBackend) -> Bridge {
        let bridge = Bridge::new(Arc::new(settings));
        let backend: Arc<dyn Backend> = Arc::new(backend.clone());
        bridge.connection().publish(Connected {
            backend,
            version: "[Redis test]".to_string(),
        });
        bridge
    }

    #[tokio::test]
    async fn test_overview_requires_ui() {
        let backend = ScriptedBackend::new();
        let bridge = connected_bridge(SettingsStore::isolated(), &backend);

        bridge.resource("shop").get_async("k").await.unwrap();
        assert_eq!(bridge.overview(), Overview::default());

        bridge.settings().set(UI, "true");
        bridge.resource("shop").get_async("k").await.unwrap();
        let overview = bridge.overview();
        assert_eq!(overview.resources, vec!["shop"]);
        assert_eq!(overview.total_commands, 1);
    }

    #[tokio::test]
    async fn test_fetch_resource_pages_log() {
        let backend = ScriptedBackend::new();
        backend.reply("GET", RespValue::bulk_string("v"));
        let bridge = connected_bridge(SettingsStore::isolated().with(UI, "true"), &backend);

        let shop = bridge.resource("shop");
        for _ in 0..12 {
            shop.get_async("k").await.unwrap();
        }

        let query: ResourceQuery =
            serde_json::from_value(json!({"resource": "shop", "pageIndex": 1})).unwrap();
        let page = bridge.fetch_resource(&query).unwrap();
        assert_eq!(page.page_count, 2);
        assert_eq!(page.commands.len(), 2);
        assert_eq!(page.resource_commands_count, 12);
    }

    #[tokio::test]
    async fn test_connection_stats_need_a_counting_backend() {
        let bridge = Bridge::new(Arc::new(SettingsStore::isolated()));
        assert_eq!(bridge.connection_stats(), None);

        let backend = ScriptedBackend::new();
        let bridge = connected_bridge(SettingsStore::isolated(), &backend);
        assert_eq!(bridge.connection_stats(), None);

        let counting = ScriptedBackend::counting();
        let bridge = connected_bridge(SettingsStore::isolated(), &counting);
        bridge.resource("shop").get_async("k").await.unwrap();
        let stats = bridge.connection_stats().unwrap();
        assert_eq!(stats.commands_sent, 1);
        assert_eq!(stats.reconnects, 0);
    }

    #[tokio::test]
    async fn test_failures_reach_subscribers() {
        let backend = ScriptedBackend::new();
        backend.reply("INCR", RespValue::error("ERR value is not an integer"));
        let bridge = connected_bridge(SettingsStore::isolated(), &backend);
        let mut failures = bridge.subscribe_failures();

        assert!(bridge.resource("bank").incr_async("name").await.is_err());
        let failure = failures.recv().await.unwrap();
        assert_eq!(failure.caller, "bank");
        assert_eq!(failure.args, vec![json!("name")]);
    }
}
