//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`KeelSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `KEEL_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::KeelSettings;

/// Resolve the settings file path.
///
/// `KEEL_SETTINGS_PATH` wins; otherwise `~/.keel/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(path) = read_env_string("KEEL_SETTINGS_PATH") {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".keel").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<KeelSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, starts from defaults. Invalid JSON or values
/// that fail validation are errors.
pub fn load_settings_from_path(path: &Path) -> Result<KeelSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
fn load_file_layer(path: &Path) -> Result<KeelSettings> {
    let defaults = serde_json::to_value(KeelSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut KeelSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Each variable has strict parsing rules; invalid or out-of-range values are
/// logged and ignored (the file/default value stays).
pub fn apply_overrides<F>(settings: &mut KeelSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── State ───────────────────────────────────────────────────────
    if let Some(v) = env.u64("KEEL_STATE_TTL_HOURS", 1, 8760) {
        settings.state.ttl_hours = v;
    }

    // ── Audit ───────────────────────────────────────────────────────
    if let Some(v) = env.usize("KEEL_AUDIT_BUFFER_CAPACITY", 1, 100_000) {
        settings.audit.buffer_capacity = v;
    }
    if let Some(v) = env.usize("KEEL_AUDIT_QUERY_LIMIT", 1, 10_000) {
        settings.audit.default_query_limit = v;
    }

    // ── Lifecycle ───────────────────────────────────────────────────
    if let Some(v) = env.u64("KEEL_INIT_TIMEOUT_MS", 1, 600_000) {
        settings.lifecycle.init_timeout_ms = v;
    }
    if let Some(v) = env.u64("KEEL_START_TIMEOUT_MS", 1, 600_000) {
        settings.lifecycle.start_timeout_ms = v;
    }
    if let Some(v) = env.u64("KEEL_STOP_TIMEOUT_MS", 1, 600_000) {
        settings.lifecycle.stop_timeout_ms = v;
    }
    if let Some(v) = env.u64("KEEL_HEALTH_TIMEOUT_MS", 1, 600_000) {
        settings.lifecycle.health_timeout_ms = v;
    }

    // ── Storage ─────────────────────────────────────────────────────
    if let Some(v) = env.string("KEEL_DB_PATH") {
        settings.storage.db_path = v;
    }
    if let Some(v) = env.u64("KEEL_DB_POOL_SIZE", 1, 64) {
        settings.storage.pool_size = u32::try_from(v).unwrap_or(settings.storage.pool_size);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("KEEL_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("KEEL_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env readers ─────────────────────────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = (self.lookup)(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}
