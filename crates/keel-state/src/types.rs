//! State store data types.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::StateWarning;

/// One entity's cached state.
///
/// This is also the JSON document written to the config store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateEntry {
    /// Entity the state belongs to.
    pub entity_id: String,
    /// Arbitrary orchestrator state.
    pub fields: Value,
    /// Store-wide version assigned at save time.
    pub version: u64,
    /// When the save happened.
    pub saved_at: DateTime<Utc>,
}

impl StateEntry {
    /// The JSON document stored under this entity's key.
    ///
    /// Built field by field so it cannot fail; it deserializes back into an
    /// equal entry.
    pub fn to_document(&self) -> Value {
        let mut doc = Map::new();
        let _ = doc.insert("entityId".into(), Value::String(self.entity_id.clone()));
        let _ = doc.insert("fields".into(), self.fields.clone());
        let _ = doc.insert("version".into(), Value::from(self.version));
        let _ = doc.insert(
            "savedAt".into(),
            Value::String(self.saved_at.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        );
        Value::Object(doc)
    }
}

/// Where a loaded state came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateSource {
    /// Served from the in-memory cache.
    Cache,
    /// Read from the backing store.
    Database,
    /// Not found, stale, or unreadable.
    None,
}

impl std::fmt::Display for StateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Cache => "cache",
            Self::Database => "database",
            Self::None => "none",
        })
    }
}

/// Options for `save_state`.
#[derive(Clone, Debug)]
pub struct SaveOptions {
    /// Write through to the backing store. `false` updates the cache only.
    pub persist: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self { persist: true }
    }
}

/// Options for `load_state`.
#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    /// Skip the cache and read the backing store.
    pub bypass_cache: bool,
}

/// Result of a successful save.
#[derive(Debug)]
pub struct SaveReceipt {
    /// Version assigned to the saved entry.
    pub version: u64,
    /// Set when the write-through failed; the cache still holds the state.
    pub warning: Option<StateWarning>,
}

impl SaveReceipt {
    /// Whether the state also reached the backing store (or was not meant to).
    pub fn persisted(&self) -> bool {
        self.warning.is_none()
    }
}

/// Result of a load.
#[derive(Debug)]
pub struct LoadedState {
    /// The state, if any.
    pub state: Option<Value>,
    /// Where it came from.
    pub source: StateSource,
    /// Staleness, corruption or backing-store trouble.
    pub warning: Option<StateWarning>,
}

impl LoadedState {
    pub(crate) fn found(state: Value, source: StateSource) -> Self {
        Self {
            state: Some(state),
            source,
            warning: None,
        }
    }

    pub(crate) fn absent(warning: Option<StateWarning>) -> Self {
        Self {
            state: None,
            source: StateSource::None,
            warning,
        }
    }
}

/// Result of `clear_state`.
#[derive(Debug)]
pub struct ClearReceipt {
    /// Whether the entity was cached before the call.
    pub was_cached: bool,
    /// Whether the backing store reported a deleted document.
    pub deleted_from_store: bool,
    /// Set when the backing-store delete failed.
    pub warning: Option<StateWarning>,
}
