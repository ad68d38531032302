//! Polled runtime settings.
//!
//! Settings live in a key/value store that can change at any time: an
//! operator may flip the debug toggle while the process runs. Nothing here
//! is cached; every call to [`SettingsStore::settings`] re-reads the store.
//!
//! Values are looked up in the in-process overrides first, then in the
//! environment under the upper-cased key (`redis_debug` → `REDIS_DEBUG`).

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;
use tracing::warn;

pub const CONNECTION_STRING: &str = "redis_connection_string";
pub const UI: &str = "redis_ui";
pub const SLOW_QUERY_WARNING: &str = "redis_slow_query_warning";
pub const DEBUG: &str = "redis_debug";
pub const LOG_SIZE: &str = "redis_log_size";

pub const DEFAULT_SLOW_QUERY_WARNING_MS: u64 = 200;
pub const DEFAULT_LOG_SIZE: usize = 100;

/// Per-caller log capacity while debug mode is on.
pub const DEBUG_LOG_SIZE: usize = 10_000;

/// Verbose query logging.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DebugMode {
    #[default]
    Disabled,
    All,
    /// Only these callers are logged.
    Callers(BTreeSet<String>),
}

impl DebugMode {
    /// `"false"` disables, `"true"` enables for everyone, a JSON array of
    /// strings names the callers. Anything unparsable enables for everyone.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "" | "false" => DebugMode::Disabled,
            "true" => DebugMode::All,
            other => match serde_json::from_str::<Vec<String>>(other) {
                Ok(list) if list.is_empty() => DebugMode::Disabled,
                Ok(list) => DebugMode::Callers(list.into_iter().collect()),
                Err(_) => DebugMode::All,
            },
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, DebugMode::Disabled)
    }

    pub fn includes(&self, caller: &str) -> bool {
        match self {
            DebugMode::Disabled => false,
            DebugMode::All => true,
            DebugMode::Callers(list) => list.contains(caller),
        }
    }

    /// The store representation.
    pub fn to_setting(&self) -> String {
        match self {
            DebugMode::Disabled => "false".to_string(),
            DebugMode::All => "true".to_string(),
            DebugMode::Callers(list) => {
                serde_json::to_string(list).unwrap_or_else(|_| "false".to_string())
            }
        }
    }
}

/// One consistent read of every instrumentation setting.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub ui: bool,
    pub slow_query_warning_ms: u64,
    pub debug: DebugMode,
    /// Capacity of each per-caller log buffer.
    pub log_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ui: false,
            slow_query_warning_ms: DEFAULT_SLOW_QUERY_WARNING_MS,
            debug: DebugMode::Disabled,
            log_size: DEFAULT_LOG_SIZE,
        }
    }
}

/// Key/value settings with in-process overrides over the environment.
#[derive(Debug)]
pub struct SettingsStore {
    overrides: RwLock<HashMap<String, String>>,
    read_env: bool,
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::from_env()
    }
}

impl SettingsStore {
    /// A store that falls back to process environment variables.
    pub fn from_env() -> Self {
        Self {
            overrides: RwLock::new(HashMap::new()),
            read_env: true,
        }
    }

    /// A store that only sees values set on it. Used by tests and embedders
    /// that push settings themselves.
    pub fn isolated() -> Self {
        Self {
            overrides: RwLock::new(HashMap::new()),
            read_env: false,
        }
    }

    pub fn with(self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let overridden = self
            .overrides
            .read()
            .ok()
            .and_then(|map| map.get(key).cloned());

        match overridden {
            Some(value) => Some(value),
            None if self.read_env => std::env::var(key.to_ascii_uppercase()).ok(),
            None => None,
        }
    }

    pub fn set(&self, key: &str, value: impl Into<String>) {
        if let Ok(mut map) = self.overrides.write() {
            map.insert(key.to_string(), value.into());
        }
    }

    fn get_bool(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| v.trim() == "true")
    }

    fn get_number<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        match self.get(key) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(key, value = %raw, "Ignoring non-numeric setting");
                default
            }),
            None => default,
        }
    }

    pub fn connection_string(&self) -> Option<String> {
        self.get(CONNECTION_STRING).filter(|s| !s.trim().is_empty())
    }

    pub fn debug_mode(&self) -> DebugMode {
        self.get(DEBUG)
            .map(|raw| DebugMode::parse(&raw))
            .unwrap_or_default()
    }

    /// Reads every instrumentation setting now.
    pub fn settings(&self) -> Settings {
        let debug = self.debug_mode();
        let log_size = if debug.is_enabled() {
            DEBUG_LOG_SIZE
        } else {
            self.get_number(LOG_SIZE, DEFAULT_LOG_SIZE)
        };

        Settings {
            ui: self.get_bool(UI),
            slow_query_warning_ms: self.get_number(SLOW_QUERY_WARNING, DEFAULT_SLOW_QUERY_WARNING_MS),
            debug,
            log_size,
        }
    }

    /// Adds a caller to the debug list. Blanket debug mode is narrowed to
    /// the list.
    pub fn add_debug_caller(&self, caller: &str) -> DebugMode {
        let mut list = match self.debug_mode() {
            DebugMode::Callers(list) => list,
            DebugMode::Disabled | DebugMode::All => BTreeSet::new(),
        };
        list.insert(caller.to_string());

        let mode = DebugMode::Callers(list);
        self.set(DEBUG, mode.to_setting());
        mode
    }

    /// Removes a caller from the debug list. An emptied list disables debug
    /// mode. Returns `None` if debug mode is not a list or the caller was not
    /// in it.
    pub fn remove_debug_caller(&self, caller: &str) -> Option<DebugMode> {
        let DebugMode::Callers(mut list) = self.debug_mode() else {
            return None;
        };
        if !list.remove(caller) {
            return None;
        }

        let mode = if list.is_empty() {
            DebugMode::Disabled
        } else {
            DebugMode::Callers(list)
        };
        self.set(DEBUG, mode.to_setting());
        Some(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let store = SettingsStore::isolated();
        assert_eq!(store.settings(), Settings::default());
        assert_eq!(store.connection_string(), None);
    }

    #[test]
    fn test_debug_mode_parsing() {
        assert_eq!(DebugMode::parse("false"), DebugMode::Disabled);
        assert_eq!(DebugMode::parse("true"), DebugMode::All);
        assert_eq!(DebugMode::parse("[]"), DebugMode::Disabled);
        assert_eq!(DebugMode::parse("{broken"), DebugMode::All);

        let mode = DebugMode::parse(r#"["resourceA"]"#);
        assert!(mode.includes("resourceA"));
        assert!(!mode.includes("resourceB"));
    }

    #[test]
    fn test_debug_raises_log_size() {
        let store = SettingsStore::isolated().with(LOG_SIZE, "5");
        assert_eq!(store.settings().log_size, 5);

        store.set(DEBUG, "true");
        assert_eq!(store.settings().log_size, DEBUG_LOG_SIZE);
    }

    #[test]
    fn test_values_are_reread() {
        let store = SettingsStore::isolated();
        assert!(!store.settings().ui);
        store.set(UI, "true");
        store.set(SLOW_QUERY_WARNING, "50");
        let settings = store.settings();
        assert!(settings.ui);
        assert_eq!(settings.slow_query_warning_ms, 50);
    }

    #[test]
    fn test_bad_number_uses_default() {
        let store = SettingsStore::isolated().with(SLOW_QUERY_WARNING, "fast");
        assert_eq!(
            store.settings().slow_query_warning_ms,
            DEFAULT_SLOW_QUERY_WARNING_MS
        );
    }

    #[test]
    fn test_add_and_remove_debug_callers() {
        let store = SettingsStore::isolated().with(DEBUG, "true");

        store.add_debug_caller("a");
        store.add_debug_caller("b");
        assert_eq!(store.get(DEBUG).as_deref(), Some(r#"["a","b"]"#));

        assert_eq!(store.remove_debug_caller("zzz"), None);
        store.remove_debug_caller("a");
        assert!(store.debug_mode().includes("b"));
        assert_eq!(store.remove_debug_caller("b"), Some(DebugMode::Disabled));
        assert_eq!(store.get(DEBUG).as_deref(), Some("false"));
    }
}
