//! [`StateStore`]: cache-first state with write-through persistence.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use keel_core::constants::STATE_KEY_PREFIX;
use keel_core::ConfigStore;
use keel_settings::StateSettings;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::errors::{Result, StateError, StateWarning};
use crate::types::{
    ClearReceipt, LoadOptions, LoadedState, SaveOptions, SaveReceipt, StateEntry, StateSource,
};

#[derive(Default)]
struct Cache {
    entries: HashMap<String, StateEntry>,
    version: u64,
}

/// Cache-first orchestrator state store.
///
/// The cache is authoritative: a save always lands in memory, and backing-store
/// failures only ever surface as warnings.
pub struct StateStore {
    cache: Mutex<Cache>,
    ttl: chrono::Duration,
    ttl_hours: u64,
}

impl StateStore {
    /// Create an empty store with the given TTL settings.
    pub fn new(settings: StateSettings) -> Self {
        let ttl = chrono::Duration::from_std(settings.ttl()).unwrap_or(chrono::Duration::MAX);
        Self {
            cache: Mutex::new(Cache::default()),
            ttl,
            ttl_hours: settings.ttl_hours,
        }
    }

    /// Save `state` for `entity_id`.
    ///
    /// The cache and the version counter are updated before the backing store
    /// is touched. A failed upsert is reported in [`SaveReceipt::warning`].
    #[instrument(skip_all, fields(entity_id = %entity_id, persist = options.persist))]
    pub async fn save_state(
        &self,
        handle: Option<&dyn ConfigStore>,
        entity_id: &str,
        state: Value,
        options: &SaveOptions,
    ) -> Result<SaveReceipt> {
        let Some(handle) = handle else {
            return Err(StateError::MissingInput("no persistence handle"));
        };
        if entity_id.is_empty() {
            return Err(StateError::MissingInput("entity id is empty"));
        }

        let (version, saved_at, document) = {
            let mut cache = self.cache.lock();
            let entry = StateEntry {
                entity_id: entity_id.to_string(),
                fields: state,
                version: cache.version + 1,
                saved_at: Utc::now(),
            };
            let document = entry.to_document();
            cache.version = entry.version;
            let (version, saved_at) = (entry.version, entry.saved_at);
            let _ = cache.entries.insert(entity_id.to_string(), entry);
            (version, saved_at, document)
        };

        if !options.persist {
            debug!(version, "state cached without write-through");
            return Ok(SaveReceipt {
                version,
                warning: None,
            });
        }

        let warning = match handle.upsert(&state_key(entity_id), &document, saved_at).await {
            Ok(()) => {
                debug!(version, "state saved");
                None
            }
            Err(e) => {
                warn!(version, error = %e, "state persistence failed, cache only");
                Some(StateWarning::Persistence(e))
            }
        };

        Ok(SaveReceipt { version, warning })
    }

    /// Load the state for `entity_id`, cache first.
    #[instrument(skip_all, fields(entity_id = %entity_id, bypass_cache = options.bypass_cache))]
    pub async fn load_state(
        &self,
        handle: Option<&dyn ConfigStore>,
        entity_id: &str,
        options: &LoadOptions,
    ) -> Result<LoadedState> {
        if entity_id.is_empty() {
            return Err(StateError::MissingInput("entity id is empty"));
        }

        if !options.bypass_cache {
            if let Some(entry) = self.cache.lock().entries.get(entity_id) {
                return Ok(LoadedState::found(entry.fields.clone(), StateSource::Cache));
            }
        }

        let Some(handle) = handle else {
            return Err(StateError::MissingHandle);
        };

        let record = match handle.get(&state_key(entity_id)).await {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(LoadedState::absent(None)),
            Err(e) => {
                warn!(error = %e, "state read failed");
                return Ok(LoadedState::absent(Some(StateWarning::Persistence(e))));
            }
        };

        let entry: StateEntry = match serde_json::from_value(record.value) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "stored state is not a valid entry");
                return Ok(LoadedState::absent(Some(StateWarning::Corrupt(e.to_string()))));
            }
        };

        if self.is_stale(entry.saved_at, Utc::now()) {
            debug!(saved_at = %entry.saved_at, "stored state is stale");
            return Ok(LoadedState::absent(Some(StateWarning::Stale {
                saved_at: entry.saved_at,
                ttl_hours: self.ttl_hours,
            })));
        }

        let (fields, source) = {
            let mut cache = self.cache.lock();
            // Later saves keep counting past whatever this process restored.
            cache.version = cache.version.max(entry.version);
            match cache.entries.get(entity_id) {
                // A racing or cache-only save is newer than the stored entry.
                Some(cached) if cached.version > entry.version => {
                    (cached.fields.clone(), StateSource::Cache)
                }
                _ => {
                    let fields = entry.fields.clone();
                    let _ = cache.entries.insert(entity_id.to_string(), entry);
                    (fields, StateSource::Database)
                }
            }
        };

        Ok(LoadedState::found(fields, source))
    }

    /// Drop `entity_id` from the cache and, if a handle is given, from the
    /// backing store.
    #[instrument(skip_all, fields(entity_id = %entity_id))]
    pub async fn clear_state(
        &self,
        handle: Option<&dyn ConfigStore>,
        entity_id: &str,
    ) -> Result<ClearReceipt> {
        if entity_id.is_empty() {
            return Err(StateError::MissingInput("entity id is empty"));
        }

        let was_cached = self.cache.lock().entries.remove(entity_id).is_some();

        let Some(handle) = handle else {
            return Ok(ClearReceipt {
                was_cached,
                deleted_from_store: false,
                warning: None,
            });
        };

        match handle.delete(&state_key(entity_id)).await {
            Ok(deleted) => Ok(ClearReceipt {
                was_cached,
                deleted_from_store: deleted,
                warning: None,
            }),
            Err(e) => {
                warn!(error = %e, "state delete failed, cache cleared");
                Ok(ClearReceipt {
                    was_cached,
                    deleted_from_store: false,
                    warning: Some(StateWarning::Persistence(e)),
                })
            }
        }
    }

    /// Empty the cache and reset the version counter.
    pub fn clear_cache(&self) {
        let mut cache = self.cache.lock();
        cache.entries.clear();
        cache.version = 0;
    }

    /// Cached entity ids, sorted.
    pub fn cached_entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.cache.lock().entries.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Current value of the store-wide version counter.
    pub fn version(&self) -> u64 {
        self.cache.lock().version
    }

    /// Cached entry for `entity_id`, if any.
    pub fn cached_entry(&self, entity_id: &str) -> Option<StateEntry> {
        self.cache.lock().entries.get(entity_id).cloned()
    }

    fn is_stale(&self, saved_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(saved_at) > self.ttl
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(StateSettings::default())
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.cache.lock();
        f.debug_struct("StateStore")
            .field("cached", &cache.entries.len())
            .field("version", &cache.version)
            .field("ttl_hours", &self.ttl_hours)
            .finish()
    }
}

fn state_key(entity_id: &str) -> String {
    format!("{STATE_KEY_PREFIX}{entity_id}")
}
