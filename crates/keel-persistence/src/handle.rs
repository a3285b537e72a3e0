//! [`SqlitePersistence`]: the async persistence handle over the pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keel_core::{ConfigRecord, ConfigStore, EventLogStore, EventQuery, EventRow, PersistenceError};
use keel_settings::StorageSettings;
use rusqlite::Connection;
use serde_json::Value;
use tracing::{debug, info};

use crate::connection::{self, ConnectionConfig, ConnectionPool};
use crate::errors::Result;
use crate::migrations;
use crate::repositories::{ConfigRepo, DecisionLogRepo};

/// `SQLite`-backed [`ConfigStore`] + [`EventLogStore`].
///
/// Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: ConnectionPool,
}

impl SqlitePersistence {
    /// Open the database described by `settings`, running pending migrations.
    pub fn open(settings: &StorageSettings) -> Result<Self> {
        Self::open_file(&settings.db_path, &ConnectionConfig::from(settings))
    }

    /// Open a file-backed database, running pending migrations.
    pub fn open_file(path: &str, config: &ConnectionConfig) -> Result<Self> {
        let pool = connection::new_file(path, config)?;
        info!(path, pool_size = config.pool_size, "opened sqlite persistence");
        Self::from_pool(pool)
    }

    /// Open a private in-memory database (for tests and ephemeral hosts).
    pub fn in_memory() -> Result<Self> {
        Self::from_pool(connection::new_in_memory(&ConnectionConfig::default())?)
    }

    /// Wrap an existing pool, running pending migrations on it.
    pub fn from_pool(pool: ConnectionPool) -> Result<Self> {
        {
            let conn = pool.get()?;
            let applied = migrations::run_migrations(&conn)?;
            debug!(applied, "schema ready");
        }
        Ok(Self { pool })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Run `op` on a pooled connection on the blocking thread pool.
    async fn run<T, F>(&self, op: &'static str, f: F) -> keel_core::errors::Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        let joined = tokio::task::spawn_blocking(move || -> Result<T> {
            let conn = pool.get()?;
            f(&conn)
        })
        .await;

        match joined {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                debug!(op, error = %e, "sqlite operation failed");
                Err(PersistenceError::from(e))
            }
            Err(e) => Err(PersistenceError::TaskJoin(e.to_string())),
        }
    }
}

impl std::fmt::Debug for SqlitePersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.pool.state();
        f.debug_struct("SqlitePersistence")
            .field("connections", &state.connections)
            .field("idle_connections", &state.idle_connections)
            .finish()
    }
}

#[async_trait]
impl ConfigStore for SqlitePersistence {
    async fn upsert(
        &self,
        key: &str,
        value: &Value,
        updated_at: DateTime<Utc>,
    ) -> keel_core::errors::Result<()> {
        let key = key.to_string();
        let value = value.clone();
        self.run("config.upsert", move |conn| {
            ConfigRepo::upsert(conn, &key, &value, updated_at)
        })
        .await
    }

    async fn get(&self, key: &str) -> keel_core::errors::Result<Option<ConfigRecord>> {
        let key = key.to_string();
        self.run("config.get", move |conn| ConfigRepo::get(conn, &key))
            .await
    }

    async fn delete(&self, key: &str) -> keel_core::errors::Result<bool> {
        let key = key.to_string();
        self.run("config.delete", move |conn| ConfigRepo::delete(conn, &key))
            .await
    }
}

#[async_trait]
impl EventLogStore for SqlitePersistence {
    async fn insert(&self, row: &EventRow) -> keel_core::errors::Result<()> {
        let row = row.clone();
        self.run("decision_log.insert", move |conn| {
            DecisionLogRepo::insert(conn, &row)
        })
        .await
    }

    async fn insert_many(&self, rows: &[EventRow]) -> keel_core::errors::Result<()> {
        let rows = rows.to_vec();
        self.run("decision_log.insert_many", move |conn| {
            DecisionLogRepo::insert_many(conn, &rows)
        })
        .await
    }

    async fn query(&self, query: &EventQuery) -> keel_core::errors::Result<Vec<EventRow>> {
        let query = query.clone();
        self.run("decision_log.query", move |conn| {
            DecisionLogRepo::query(conn, &query)
        })
        .await
    }
}
