//! In-memory persistence handle with fault injection.
//!
//! [`MemoryPersistence`] implements both stores over plain collections. It
//! can be switched unavailable to simulate a backing-store outage, and it
//! counts calls so callers can assert which operations reached the store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use super::{ConfigRecord, ConfigStore, EventLogStore, EventQuery, EventRow};
use crate::errors::{PersistenceError, Result};

/// Snapshot of how many calls reached each store operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `ConfigStore::get` calls.
    pub config_reads: usize,
    /// `ConfigStore::upsert` calls.
    pub config_writes: usize,
    /// `ConfigStore::delete` calls.
    pub config_deletes: usize,
    /// `EventLogStore::insert` and `insert_many` calls.
    pub event_inserts: usize,
    /// `EventLogStore::query` calls.
    pub event_queries: usize,
}

#[derive(Default)]
struct Counters {
    config_reads: AtomicUsize,
    config_writes: AtomicUsize,
    config_deletes: AtomicUsize,
    event_inserts: AtomicUsize,
    event_queries: AtomicUsize,
}

#[derive(Default)]
struct Tables {
    config: BTreeMap<String, ConfigRecord>,
    events: Vec<EventRow>,
}

/// Collection-backed [`ConfigStore`] + [`EventLogStore`].
///
/// Calls made while unavailable fail with [`PersistenceError::Unavailable`]
/// and leave the tables untouched, but are still counted.
pub struct MemoryPersistence {
    tables: Mutex<Tables>,
    available: AtomicBool,
    counters: Counters,
}

impl MemoryPersistence {
    /// Create an empty, available store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            available: AtomicBool::new(true),
            counters: Counters::default(),
        }
    }

    /// Toggle availability. While unavailable every call fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Whether the store currently accepts calls.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Write a document directly, bypassing availability and counters.
    pub fn seed_config(&self, key: &str, value: Value, updated_at: DateTime<Utc>) {
        let record = ConfigRecord {
            key: key.to_string(),
            value,
            updated_at,
        };
        let _ = self.tables.lock().config.insert(key.to_string(), record);
    }

    /// Read a document directly, bypassing availability and counters.
    pub fn config_record(&self, key: &str) -> Option<ConfigRecord> {
        self.tables.lock().config.get(key).cloned()
    }

    /// All event rows in insertion order.
    pub fn events(&self) -> Vec<EventRow> {
        self.tables.lock().events.clone()
    }

    /// Snapshot of call counters.
    pub fn calls(&self) -> CallCounts {
        CallCounts {
            config_reads: self.counters.config_reads.load(Ordering::SeqCst),
            config_writes: self.counters.config_writes.load(Ordering::SeqCst),
            config_deletes: self.counters.config_deletes.load(Ordering::SeqCst),
            event_inserts: self.counters.event_inserts.load(Ordering::SeqCst),
            event_queries: self.counters.event_queries.load(Ordering::SeqCst),
        }
    }

    fn check_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(PersistenceError::Unavailable(
                "in-memory store is offline".to_string(),
            ))
        }
    }
}

impl Default for MemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.lock();
        f.debug_struct("MemoryPersistence")
            .field("config_count", &tables.config.len())
            .field("event_count", &tables.events.len())
            .field("available", &self.is_available())
            .finish()
    }
}

#[async_trait]
impl ConfigStore for MemoryPersistence {
    async fn upsert(&self, key: &str, value: &Value, updated_at: DateTime<Utc>) -> Result<()> {
        let _ = self.counters.config_writes.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.seed_config(key, value.clone(), updated_at);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<ConfigRecord>> {
        let _ = self.counters.config_reads.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.config_record(key))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let _ = self.counters.config_deletes.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.tables.lock().config.remove(key).is_some())
    }
}

#[async_trait]
impl EventLogStore for MemoryPersistence {
    async fn insert(&self, row: &EventRow) -> Result<()> {
        let _ = self.counters.event_inserts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.tables.lock().events.push(row.clone());
        Ok(())
    }

    async fn insert_many(&self, rows: &[EventRow]) -> Result<()> {
        let _ = self.counters.event_inserts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.tables.lock().events.extend_from_slice(rows);
        Ok(())
    }

    async fn query(&self, query: &EventQuery) -> Result<Vec<EventRow>> {
        let _ = self.counters.event_queries.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let tables = self.tables.lock();
        let mut rows: Vec<EventRow> = tables
            .events
            .iter()
            .filter(|row| query.matches(row))
            .cloned()
            .collect();
        // Newest first; ties keep the later insert first.
        rows.reverse();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(query.limit);
        Ok(rows)
    }
}
