//! The persistence-handle boundary.
//!
//! A host supplies one object exposing two logical record stores:
//!
//! - [`ConfigStore`]: key-value documents. Upsert by key (the key is the
//!   conflict target), point lookup, delete.
//! - [`EventLogStore`]: append-only structured rows. Insert, and query by
//!   equality on the type/entity columns plus an inclusive time range,
//!   newest first, capped by a row limit.
//!
//! [`PersistenceHandle`] is the union of both and is blanket-implemented for
//! any type implementing the two traits. Facilities only ask for the half
//! they use.

mod memory;

pub use memory::{CallCounts, MemoryPersistence};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Result;

/// A document stored in the config store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRecord {
    /// Unique key (conflict target for upserts).
    pub key: String,
    /// JSON document.
    pub value: Value,
    /// When the document was last written.
    pub updated_at: DateTime<Utc>,
}

/// A row in the append-only event log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRow {
    /// Globally unique row id.
    pub id: String,
    /// Indexed decision-type column.
    pub decision_type: String,
    /// Indexed event-type column.
    pub event_type: String,
    /// Indexed entity column.
    pub entity_id: Option<String>,
    /// Unstructured JSON payload.
    pub payload: Value,
    /// Row timestamp; queries order by this column descending. Stores may
    /// keep only microseconds.
    pub created_at: DateTime<Utc>,
}

/// Filters for [`EventLogStore::query`].
///
/// All set filters must match. `since` and `until` are inclusive.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventQuery {
    /// Equality filter on `decision_type`.
    pub decision_type: Option<String>,
    /// Equality filter on `event_type`.
    pub event_type: Option<String>,
    /// Equality filter on `entity_id`.
    pub entity_id: Option<String>,
    /// Lower time bound (`created_at >= since`).
    pub since: Option<DateTime<Utc>>,
    /// Upper time bound (`created_at <= until`).
    pub until: Option<DateTime<Utc>>,
    /// Maximum rows returned.
    pub limit: usize,
}

impl EventQuery {
    /// Whether `row` satisfies every filter. Ignores `limit`.
    ///
    /// Stores that cannot push filters down (such as the in-memory handle)
    /// evaluate rows with this.
    pub fn matches(&self, row: &EventRow) -> bool {
        if self
            .decision_type
            .as_ref()
            .is_some_and(|t| *t != row.decision_type)
        {
            return false;
        }
        if self.event_type.as_ref().is_some_and(|t| *t != row.event_type) {
            return false;
        }
        if self
            .entity_id
            .as_ref()
            .is_some_and(|id| row.entity_id.as_ref() != Some(id))
        {
            return false;
        }
        if self.since.is_some_and(|since| row.created_at < since) {
            return false;
        }
        if self.until.is_some_and(|until| row.created_at > until) {
            return false;
        }
        true
    }
}

/// Key-value document store.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Insert or overwrite the document at `key`.
    async fn upsert(&self, key: &str, value: &Value, updated_at: DateTime<Utc>) -> Result<()>;

    /// Point lookup by key.
    async fn get(&self, key: &str) -> Result<Option<ConfigRecord>>;

    /// Delete by key. Returns whether a document existed.
    async fn delete(&self, key: &str) -> Result<bool>;
}

/// Append-only event log.
#[async_trait]
pub trait EventLogStore: Send + Sync {
    /// Append one row.
    async fn insert(&self, row: &EventRow) -> Result<()>;

    /// Append several rows.
    ///
    /// Implementations backed by a transactional store should make this
    /// all-or-nothing. The default inserts sequentially and stops at the first
    /// failure.
    async fn insert_many(&self, rows: &[EventRow]) -> Result<()> {
        for row in rows {
            self.insert(row).await?;
        }
        Ok(())
    }

    /// Query rows, newest first, at most `query.limit` of them.
    async fn query(&self, query: &EventQuery) -> Result<Vec<EventRow>>;
}

/// A full persistence handle: both stores behind one object.
pub trait PersistenceHandle: ConfigStore + EventLogStore {}

impl<T: ConfigStore + EventLogStore + ?Sized> PersistenceHandle for T {}
