//! Errors raised at the persistence boundary.
//!
//! [`PersistenceError`] is what every [`ConfigStore`](crate::ConfigStore) and
//! [`EventLogStore`](crate::EventLogStore) implementation returns. The
//! facilities never propagate it to their callers as a hard failure; they
//! degrade and surface it as a warning or a buffered disposition instead.

use thiserror::Error;

/// A backing-store call failed or the store is unreachable.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The store could not be reached (network down, pool exhausted, outage).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store was reached but rejected or failed the operation.
    #[error("store error: {0}")]
    Backend(String),

    /// A payload could not be encoded or decoded as JSON.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The blocking task running the store call panicked or was cancelled.
    #[error("store task failed: {0}")]
    TaskJoin(String),
}

impl PersistenceError {
    /// Whether this error means the store was unreachable rather than failing.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Convenience alias for persistence results.
pub type Result<T> = std::result::Result<T, PersistenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_display() {
        let err = PersistenceError::Unavailable("connection refused".into());
        assert_eq!(err.to_string(), "store unavailable: connection refused");
        assert!(err.is_unavailable());
    }

    #[test]
    fn backend_display() {
        let err = PersistenceError::Backend("constraint failed".into());
        assert_eq!(err.to_string(), "store error: constraint failed");
        assert!(!err.is_unavailable());
    }

    #[test]
    fn from_serde_error() {
        let serde_err = serde_json::from_str::<String>("bad").unwrap_err();
        let err: PersistenceError = serde_err.into();
        assert!(matches!(err, PersistenceError::Serde(_)));
        assert!(err.to_string().starts_with("serde error"));
    }
}
