//! Lifecycle errors.

use thiserror::Error;

use crate::hooks::HookKind;

/// Lifecycle failures. Each one is isolated to a single service.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The service configuration is unusable.
    #[error("misconfigured service: {0}")]
    Misconfigured(String),

    /// A hook exceeded its budget.
    #[error("{service}: {hook} hook timed out after {timeout_ms}ms")]
    Timeout {
        /// Service name.
        service: String,
        /// Which hook.
        hook: HookKind,
        /// The budget that was exceeded.
        timeout_ms: u64,
    },

    /// A hook returned an error or panicked.
    #[error("{service}: {hook} hook failed: {message}")]
    Hook {
        /// Service name.
        service: String,
        /// Which hook.
        hook: HookKind,
        /// Rendered hook error.
        message: String,
    },
}

impl LifecycleError {
    /// Whether this is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
