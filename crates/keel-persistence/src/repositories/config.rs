//! Config repository: CRUD for the `orchestrator_config` table.

use chrono::{DateTime, Utc};
use keel_core::ConfigRecord;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use super::{format_ts, parse_ts};
use crate::errors::Result;

/// Config repository: stateless, every method takes `&Connection`.
pub struct ConfigRepo;

impl ConfigRepo {
    /// Insert or overwrite the document at `key`.
    pub fn upsert(
        conn: &Connection,
        key: &str,
        value: &Value,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let encoded = serde_json::to_string(value)?;
        let _ = conn.execute(
            "INSERT INTO orchestrator_config (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = excluded.updated_at",
            params![key, encoded, format_ts(updated_at)],
        )?;
        Ok(())
    }

    /// Point lookup by key.
    pub fn get(conn: &Connection, key: &str) -> Result<Option<ConfigRecord>> {
        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT key, value, updated_at FROM orchestrator_config WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        row.map(|(key, value, updated_at)| -> Result<ConfigRecord> {
            Ok(ConfigRecord {
                key,
                value: serde_json::from_str(&value)?,
                updated_at: parse_ts(&updated_at)?,
            })
        })
        .transpose()
    }

    /// Delete by key. Returns whether a row was removed.
    pub fn delete(conn: &Connection, key: &str) -> Result<bool> {
        let changed = conn.execute(
            "DELETE FROM orchestrator_config WHERE key = ?1",
            params![key],
        )?;
        Ok(changed > 0)
    }

    /// Number of stored documents.
    pub fn count(conn: &Connection) -> Result<i64> {
        Ok(conn.query_row("SELECT COUNT(*) FROM orchestrator_config", [], |row| row.get(0))?)
    }
}
