//! # keel-persistence
//!
//! `SQLite` implementation of the Keel persistence-handle boundary.
//!
//! [`SqlitePersistence`] implements both [`ConfigStore`] and
//! [`EventLogStore`] over an `r2d2` pool. Every call runs on tokio's blocking
//! pool so the async facilities never stall a runtime worker on disk I/O.
//!
//! ## Schema
//!
//! - `orchestrator_config`: key-value documents, `key` is the upsert conflict target
//! - `decision_log`: append-only decision rows indexed by type, entity and time
//!
//! Migrations are versioned and idempotent; see [`migrations`].
//!
//! [`ConfigStore`]: keel_core::ConfigStore
//! [`EventLogStore`]: keel_core::EventLogStore

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod handle;
pub mod migrations;
pub mod repositories;

pub use connection::{ConnectionConfig, ConnectionPool};
pub use errors::{Result, StorageError};
pub use handle::SqlitePersistence;
