//! Audit trail errors.

use keel_core::PersistenceError;
use thiserror::Error;

/// Why an entry was not persisted, or why a query returned nothing.
#[derive(Debug, Error)]
pub enum AuditError {
    /// No event log store was supplied; the entry was buffered.
    #[error("no persistence handle, entry buffered")]
    Buffered,

    /// A query was made without an event log store.
    #[error("no persistence handle supplied")]
    MissingHandle,

    /// The event log store call failed.
    #[error("event log unavailable: {0}")]
    Persistence(#[from] PersistenceError),

    /// A stored row or a decision type string could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl AuditError {
    /// Whether the entry ended up in the buffer for lack of a handle.
    pub fn is_buffered(&self) -> bool {
        matches!(self, Self::Buffered)
    }
}
