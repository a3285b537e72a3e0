//! Stateless repositories over a borrowed [`rusqlite::Connection`].
//!
//! Timestamps are stored as RFC 3339 UTC strings with fixed microsecond
//! precision, so lexical order in SQL equals chronological order.

pub mod config;
pub mod decision_log;

pub use config::ConfigRepo;
pub use decision_log::DecisionLogRepo;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::errors::{Result, StorageError};

/// Format a timestamp for storage.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("invalid timestamp '{raw}': {e}")))
}
