//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so partial
//! JSON files are accepted: missing fields take their compiled default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "state": { "ttlHours": 12 },
///   "lifecycle": { "healthTimeoutMs": 2000 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeelSettings {
    /// State Store settings.
    pub state: StateSettings,
    /// Audit Trail settings.
    pub audit: AuditSettings,
    /// Lifecycle Controller settings.
    pub lifecycle: LifecycleSettings,
    /// SQLite persistence settings.
    pub storage: StorageSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl KeelSettings {
    /// Reject values no facility can run with.
    pub fn validate(&self) -> Result<()> {
        if self.state.ttl_hours == 0 {
            return Err(SettingsError::InvalidValue(
                "state.ttlHours must be greater than 0".into(),
            ));
        }
        if self.audit.buffer_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "audit.bufferCapacity must be greater than 0".into(),
            ));
        }
        if self.audit.default_query_limit == 0 {
            return Err(SettingsError::InvalidValue(
                "audit.defaultQueryLimit must be greater than 0".into(),
            ));
        }
        let timeouts = [
            ("lifecycle.initTimeoutMs", self.lifecycle.init_timeout_ms),
            ("lifecycle.startTimeoutMs", self.lifecycle.start_timeout_ms),
            ("lifecycle.stopTimeoutMs", self.lifecycle.stop_timeout_ms),
            ("lifecycle.healthTimeoutMs", self.lifecycle.health_timeout_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, ms)| *ms == 0) {
            return Err(SettingsError::InvalidValue(format!(
                "{name} must be greater than 0"
            )));
        }
        if self.storage.pool_size == 0 {
            return Err(SettingsError::InvalidValue(
                "storage.poolSize must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// State Store settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateSettings {
    /// Persisted state older than this is reported absent.
    pub ttl_hours: u64,
}

impl StateSettings {
    /// TTL as a [`Duration`].
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours.saturating_mul(3600))
    }
}

impl Default for StateSettings {
    fn default() -> Self {
        Self { ttl_hours: 24 }
    }
}

/// Audit Trail settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditSettings {
    /// Maximum unflushed entries held in memory.
    pub buffer_capacity: usize,
    /// Row cap applied when a query does not set one.
    pub default_query_limit: usize,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            buffer_capacity: 100,
            default_query_limit: 50,
        }
    }
}

/// Lifecycle Controller hook budgets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LifecycleSettings {
    /// Budget for `init` hooks.
    pub init_timeout_ms: u64,
    /// Budget for `start` hooks.
    pub start_timeout_ms: u64,
    /// Budget for `stop` hooks.
    pub stop_timeout_ms: u64,
    /// Budget for `health` hooks.
    pub health_timeout_ms: u64,
}

impl LifecycleSettings {
    /// `init` budget.
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    /// `start` budget.
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    /// `stop` budget.
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// `health` budget.
    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            init_timeout_ms: 10_000,
            start_timeout_ms: 10_000,
            stop_timeout_ms: 10_000,
            health_timeout_ms: 5_000,
        }
    }
}

/// SQLite persistence settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Database file path.
    pub db_path: String,
    /// Connection pool size.
    pub pool_size: u32,
    /// `SQLite` busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

impl Default for StorageSettings {
    fn default() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        Self {
            db_path: format!("{home}/.keel/keel.db"),
            pool_size: 4,
            busy_timeout_ms: 30_000,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}
