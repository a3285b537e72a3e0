//! Runtime composition errors.

use keel_persistence::StorageError;
use keel_settings::SettingsError;
use thiserror::Error;

/// Failures while building a [`SupportLayer`](crate::SupportLayer).
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Settings could not be loaded or are invalid.
    #[error("settings: {0}")]
    Settings(#[from] SettingsError),

    /// The database could not be opened.
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
}

/// Convenience alias for runtime results.
pub type Result<T> = std::result::Result<T, RuntimeError>;
