//! # keel-runtime
//!
//! Wires the Keel facilities together for a host process.
//!
//! [`SupportLayer`] owns one [`StateStore`](keel_state::StateStore), one
//! [`AuditTrail`](keel_audit::AuditTrail) and one
//! [`ServiceRegistry`](keel_lifecycle::ServiceRegistry), all configured from
//! [`KeelSettings`](keel_settings::KeelSettings), plus an optional persistence
//! handle. [`SupportLayer::shutdown`] stops services in reverse order and
//! drains the audit buffer.

#![deny(unsafe_code)]

pub mod errors;
pub mod layer;

pub use errors::{Result, RuntimeError};
pub use layer::{ShutdownReport, SupportLayer};
