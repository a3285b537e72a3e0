//! [`AuditTrail`]: write-through audit log with a bounded retry buffer.

use std::collections::VecDeque;

use keel_core::EventLogStore;
use keel_settings::AuditSettings;
use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use crate::errors::AuditError;
use crate::types::{AuditEntry, AuditQuery, DecisionInput, Disposition, LogOptions, LogReceipt};

/// Decision audit trail.
///
/// Entries that cannot be written are kept in a FIFO buffer of
/// `buffer_capacity` entries. When the buffer is full the oldest entry is
/// evicted, so a long outage loses the oldest decisions first.
pub struct AuditTrail {
    buffer: Mutex<VecDeque<AuditEntry>>,
    capacity: usize,
    default_limit: usize,
}

impl AuditTrail {
    /// Create an empty trail.
    pub fn new(settings: AuditSettings) -> Self {
        let capacity = settings.buffer_capacity.max(1);
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            default_limit: settings.default_query_limit.max(1),
        }
    }

    /// Record a decision.
    ///
    /// Never fails: without a handle, or when the insert fails, the entry is
    /// buffered and the receipt says why.
    #[instrument(skip_all, fields(decision_type, entry_id))]
    pub async fn log_decision(
        &self,
        handle: Option<&dyn EventLogStore>,
        decision: DecisionInput,
        options: &LogOptions,
    ) -> LogReceipt {
        let entry = AuditEntry::from_input(decision);
        let entry_id = entry.entry_id.clone();
        let span = tracing::Span::current();
        let _ = span.record("decision_type", entry.decision_type.as_str());
        let _ = span.record("entry_id", entry_id.as_str());

        let Some(handle) = handle else {
            self.push(entry);
            debug!("no event log handle, decision buffered");
            return LogReceipt {
                entry_id,
                disposition: Disposition::Buffered(AuditError::Buffered),
            };
        };

        if !options.skip_flush {
            if let Err(e) = self.flush(handle).await {
                warn!(error = %e, "audit buffer flush failed");
            }
        }

        match handle.insert(&entry.to_row()).await {
            Ok(()) => LogReceipt {
                entry_id,
                disposition: Disposition::Persisted,
            },
            Err(e) => {
                warn!(error = %e, "audit insert failed, decision buffered");
                self.push(entry);
                LogReceipt {
                    entry_id,
                    disposition: Disposition::Buffered(AuditError::Persistence(e)),
                }
            }
        }
    }

    /// Write every buffered entry in one batch. Returns how many were written.
    ///
    /// On failure the batch goes back to the front of the buffer, ahead of
    /// anything buffered meanwhile, and the buffer is cut back to capacity.
    pub async fn flush(&self, handle: &dyn EventLogStore) -> Result<usize, AuditError> {
        let batch: Vec<AuditEntry> = self.buffer.lock().drain(..).collect();
        if batch.is_empty() {
            return Ok(0);
        }

        let rows: Vec<_> = batch.iter().map(AuditEntry::to_row).collect();
        match handle.insert_many(&rows).await {
            Ok(()) => {
                debug!(count = batch.len(), "audit buffer flushed");
                Ok(batch.len())
            }
            Err(e) => {
                self.requeue(batch);
                Err(AuditError::Persistence(e))
            }
        }
    }

    /// Query persisted entries, newest first.
    ///
    /// Rows that do not decode as entries are skipped.
    #[instrument(skip_all)]
    pub async fn query_audit_trail(
        &self,
        handle: Option<&dyn EventLogStore>,
        filters: &AuditQuery,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let Some(handle) = handle else {
            return Err(AuditError::MissingHandle);
        };

        let rows = handle
            .query(&filters.to_event_query(self.default_limit))
            .await
            .map_err(|e| {
                warn!(error = %e, "audit query failed");
                AuditError::Persistence(e)
            })?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id.clone();
                match AuditEntry::try_from(row) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        warn!(row_id = %id, error = %e, "skipping undecodable audit row");
                        None
                    }
                }
            })
            .filter(|entry| filters.matches_correlation(entry))
            .collect())
    }

    /// Entries waiting to be written.
    pub fn buffer_size(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Drop every buffered entry.
    pub fn clear_buffer(&self) {
        self.buffer.lock().clear();
    }

    /// Buffered entries, oldest first.
    pub fn buffered_entries(&self) -> Vec<AuditEntry> {
        self.buffer.lock().iter().cloned().collect()
    }

    /// Buffer capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn push(&self, entry: AuditEntry) {
        let mut buffer = self.buffer.lock();
        buffer.push_back(entry);
        let evicted = evict_oldest(&mut buffer, self.capacity);
        if evicted > 0 {
            warn!(evicted, capacity = self.capacity, "audit buffer full, oldest entries dropped");
        }
    }

    fn requeue(&self, batch: Vec<AuditEntry>) {
        let mut buffer = self.buffer.lock();
        for entry in batch.into_iter().rev() {
            buffer.push_front(entry);
        }
        let evicted = evict_oldest(&mut buffer, self.capacity);
        if evicted > 0 {
            warn!(evicted, capacity = self.capacity, "audit buffer full after failed flush");
        }
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new(AuditSettings::default())
    }
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail")
            .field("buffered", &self.buffer_size())
            .field("capacity", &self.capacity)
            .field("default_limit", &self.default_limit)
            .finish()
    }
}

fn evict_oldest(buffer: &mut VecDeque<AuditEntry>, capacity: usize) -> usize {
    let excess = buffer.len().saturating_sub(capacity);
    let _ = buffer.drain(..excess);
    excess
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use keel_core::MemoryPersistence;
    use crate::types::DecisionType;

    fn decision(event_type: &str) -> DecisionInput {
        DecisionInput::new(DecisionType::RoutingDecision, event_type)
    }

    #[tokio::test]
    async fn no_handle_buffers() {
        let trail = AuditTrail::default();
        let receipt = trail
            .log_decision(None, decision("x"), &LogOptions::default())
            .await;
        assert!(!receipt.logged());
        assert!(receipt.error().unwrap().to_string().ends_with("buffered"));
        assert_eq!(trail.buffer_size(), 1);
        assert_eq!(trail.buffered_entries()[0].entry_id, receipt.entry_id);
    }

    #[tokio::test]
    async fn buffer_evicts_oldest_past_capacity() {
        let trail = AuditTrail::default();
        for i in 0..105 {
            let _ = trail
                .log_decision(None, decision(&format!("e{i}")), &LogOptions::default())
                .await;
        }
        assert_eq!(trail.buffer_size(), 100);
        let entries = trail.buffered_entries();
        assert_eq!(entries.first().unwrap().event_type, "e5");
        assert_eq!(entries.last().unwrap().event_type, "e104");
    }

    #[tokio::test]
    async fn persisted_with_handle() {
        let trail = AuditTrail::default();
        let db = MemoryPersistence::new();
        let receipt = trail
            .log_decision(Some(&db), decision("x"), &LogOptions::default())
            .await;
        assert!(receipt.logged());
        assert!(receipt.error().is_none());
        assert_eq!(trail.buffer_size(), 0);
        assert_eq!(db.events().len(), 1);
        assert_eq!(db.events()[0].id, receipt.entry_id.as_str());
    }

    #[tokio::test]
    async fn buffered_entries_flush_ahead_of_new_entry() {
        let trail = AuditTrail::default();
        let db = MemoryPersistence::new();
        let _ = trail.log_decision(None, decision("first"), &LogOptions::default()).await;
        let _ = trail.log_decision(None, decision("second"), &LogOptions::default()).await;

        let receipt = trail
            .log_decision(Some(&db), decision("third"), &LogOptions::default())
            .await;
        assert!(receipt.logged());
        assert_eq!(trail.buffer_size(), 0);
        let order: Vec<String> = db.events().into_iter().map(|r| r.event_type).collect();
        assert_eq!(order, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn skip_flush_leaves_buffer() {
        let trail = AuditTrail::default();
        let db = MemoryPersistence::new();
        let _ = trail.log_decision(None, decision("old"), &LogOptions::default()).await;
        let receipt = trail
            .log_decision(Some(&db), decision("new"), &LogOptions { skip_flush: true })
            .await;
        assert!(receipt.logged());
        assert_eq!(trail.buffer_size(), 1);
        assert_eq!(db.events().len(), 1);
    }

    #[tokio::test]
    async fn insert_failure_buffers_with_store_error() {
        let trail = AuditTrail::default();
        let db = MemoryPersistence::new();
        db.set_available(false);

        let receipt = trail
            .log_decision(Some(&db), decision("x"), &LogOptions::default())
            .await;
        assert!(!receipt.logged());
        assert!(matches!(receipt.error(), Some(AuditError::Persistence(_))));
        assert_eq!(trail.buffer_size(), 1);
    }

    #[tokio::test]
    async fn failed_flush_requeues_within_capacity() {
        let trail = AuditTrail::new(AuditSettings {
            buffer_capacity: 3,
            default_query_limit: 50,
        });
        let db = MemoryPersistence::new();
        for name in ["a", "b", "c"] {
            let _ = trail.log_decision(None, decision(name), &LogOptions::default()).await;
        }
        db.set_available(false);

        let _ = trail
            .log_decision(Some(&db), decision("d"), &LogOptions::default())
            .await;
        assert_eq!(trail.buffer_size(), 3);
        let kept: Vec<String> = trail
            .buffered_entries()
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(kept, ["b", "c", "d"]);

        db.set_available(true);
        assert_eq!(trail.flush(&db).await.unwrap(), 3);
        assert_eq!(trail.buffer_size(), 0);
        assert_eq!(trail.flush(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn query_without_handle_is_error() {
        let trail = AuditTrail::default();
        let err = trail
            .query_audit_trail(None, &AuditQuery::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::MissingHandle));
    }

    #[tokio::test]
    async fn query_filters_and_orders() {
        let trail = AuditTrail::default();
        let db = MemoryPersistence::new();
        let opts = LogOptions::default();
        let _ = trail
            .log_decision(Some(&db), decision("a").entity("v-1").correlation("c-1"), &opts)
            .await;
        let _ = trail
            .log_decision(Some(&db), decision("b").entity("v-1").correlation("c-2"), &opts)
            .await;
        let _ = trail
            .log_decision(
                Some(&db),
                DecisionInput::new(DecisionType::Escalation, "c").entity("v-2"),
                &opts,
            )
            .await;

        let v1 = trail
            .query_audit_trail(Some(&db), &AuditQuery::new().entity("v-1"))
            .await
            .unwrap();
        let names: Vec<&str> = v1.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(names, ["b", "a"]);

        let correlated = trail
            .query_audit_trail(Some(&db), &AuditQuery::new().correlation("c-1"))
            .await
            .unwrap();
        assert_eq!(correlated.len(), 1);
        assert_eq!(correlated[0].event_type, "a");

        let escalations = trail
            .query_audit_trail(
                Some(&db),
                &AuditQuery::new().decision_type(DecisionType::Escalation),
            )
            .await
            .unwrap();
        assert_eq!(escalations.len(), 1);
        assert_eq!(escalations[0].entity_id.as_deref(), Some("v-2"));

        let limited = trail
            .query_audit_trail(Some(&db), &AuditQuery::new().limit(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);

        let future = trail
            .query_audit_trail(
                Some(&db),
                &AuditQuery::new().since(Utc::now() + Duration::hours(1)),
            )
            .await
            .unwrap();
        assert!(future.is_empty());
    }

    #[tokio::test]
    async fn query_failure_reports_store_error() {
        let trail = AuditTrail::default();
        let db = MemoryPersistence::new();
        db.set_available(false);
        let err = trail
            .query_audit_trail(Some(&db), &AuditQuery::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::Persistence(_)));
    }

    #[tokio::test]
    async fn undecodable_rows_are_skipped() {
        use keel_core::EventRow;

        let trail = AuditTrail::default();
        let db = MemoryPersistence::new();
        db.insert(&EventRow {
            id: "foreign".into(),
            decision_type: "legacy_kind".into(),
            event_type: "x".into(),
            entity_id: None,
            payload: serde_json::json!({}),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
        let _ = trail
            .log_decision(Some(&db), decision("ok"), &LogOptions::default())
            .await;

        let entries = trail
            .query_audit_trail(Some(&db), &AuditQuery::new())
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event_type, "ok");
    }

    #[tokio::test]
    async fn clear_buffer_empties() {
        let trail = AuditTrail::default();
        let _ = trail.log_decision(None, decision("x"), &LogOptions::default()).await;
        trail.clear_buffer();
        assert_eq!(trail.buffer_size(), 0);
    }
}
