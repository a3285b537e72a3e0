//! Package-level constants.

/// Current version of Keel (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "keel";

/// Key prefix for orchestrator state documents in the config store.
pub const STATE_KEY_PREFIX: &str = "orchestrator_state:";
