//! State store errors and warnings.
//!
//! [`StateError`] is only returned for input problems; nothing reaches the
//! backing store or the cache when one is returned. Backing-store trouble and
//! stale documents are [`StateWarning`]s attached to successful results.

use chrono::{DateTime, Utc};
use keel_core::PersistenceError;
use thiserror::Error;

/// Input errors. Returned before any side effect.
#[derive(Debug, Error)]
pub enum StateError {
    /// The entity id was empty or the required handle was absent.
    #[error("missing handle or id: {0}")]
    MissingInput(&'static str),

    /// A cache miss could not be served because no handle was supplied.
    #[error("cache miss and no persistence handle supplied")]
    MissingHandle,
}

/// Convenience alias for state store results.
pub type Result<T> = std::result::Result<T, StateError>;

/// Non-fatal conditions attached to a successful result.
#[derive(Debug, Error)]
pub enum StateWarning {
    /// The backing store call failed; the cache was used alone.
    #[error("persistence degraded: {0}")]
    Persistence(#[from] PersistenceError),

    /// The persisted document is older than the TTL and was ignored.
    #[error("stale: saved at {saved_at}, older than {ttl_hours}h")]
    Stale {
        /// When the ignored document was saved.
        saved_at: DateTime<Utc>,
        /// Configured TTL in hours.
        ttl_hours: u64,
    },

    /// The persisted document could not be decoded and was ignored.
    #[error("corrupt state document: {0}")]
    Corrupt(String),
}

impl StateWarning {
    /// Whether this warning reports a stale document.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_input_display() {
        let err = StateError::MissingInput("entity id is empty");
        assert_eq!(err.to_string(), "missing handle or id: entity id is empty");
    }

    #[test]
    fn persistence_warning_wraps_store_error() {
        let warning: StateWarning = PersistenceError::Unavailable("down".into()).into();
        assert_eq!(warning.to_string(), "persistence degraded: store unavailable: down");
        assert!(!warning.is_stale());
    }

    #[test]
    fn stale_warning_display() {
        let warning = StateWarning::Stale {
            saved_at: Utc::now(),
            ttl_hours: 24,
        };
        assert!(warning.is_stale());
        assert!(warning.to_string().starts_with("stale"));
    }
}
