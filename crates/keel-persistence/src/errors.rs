//! Error types for the `SQLite` persistence handle.
//!
//! [`StorageError`] is returned by the repositories and pool helpers. At the
//! trait boundary it is folded into [`PersistenceError`]: pool failures mean
//! the store is unreachable, everything else is a backend failure.

use keel_core::PersistenceError;
use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Filesystem error while preparing the database location.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// A stored value could not be interpreted (e.g. bad timestamp).
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Convenience type alias for storage results.
pub type Result<T> = std::result::Result<T, StorageError>;

impl From<StorageError> for PersistenceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Pool(e) => Self::Unavailable(e.to_string()),
            StorageError::Serde(e) => Self::Serde(e),
            other => Self::Backend(other.to_string()),
        }
    }
}
