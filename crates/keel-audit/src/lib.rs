//! # keel-audit
//!
//! Decision audit trail for the orchestrator.
//!
//! [`AuditTrail::log_decision`] turns a [`DecisionInput`] into an immutable
//! [`AuditEntry`] and writes it to an [`EventLogStore`](keel_core::EventLogStore).
//! When no store is given, or the write fails, the entry lands in a bounded
//! in-memory buffer instead. The buffer is drained ahead of the next write
//! and evicts its oldest entries once full, so delivery is at-least-once up to
//! the buffer capacity.

#![deny(unsafe_code)]

pub mod errors;
pub mod trail;
pub mod types;

pub use errors::AuditError;
pub use trail::AuditTrail;
pub use types::{
    AuditEntry, AuditQuery, DecisionInput, DecisionType, Disposition, LogOptions, LogReceipt,
};
