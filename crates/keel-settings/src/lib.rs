//! # keel-settings
//!
//! Configuration for the Keel runtime support layer.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`KeelSettings::default()`]
//! 2. **User file**: `~/.keel/settings.json` or `$KEEL_SETTINGS_PATH`
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `KEEL_*` overrides (highest priority)
//!
//! Each facility takes its own section explicitly (`StateStore::new(settings.state)`
//! and so on). The process-wide [`get_settings`] accessor is a convenience for
//! hosts that do not thread settings through themselves.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<KeelSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from the settings file with env var
/// overrides. If loading fails, returns compiled defaults.
pub fn get_settings() -> &'static KeelSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            KeelSettings::default()
        })
    })
}

/// Initialize the global settings with a specific value.
///
/// Returns the provided settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: KeelSettings) -> std::result::Result<(), KeelSettings> {
    SETTINGS.set(settings)
}
