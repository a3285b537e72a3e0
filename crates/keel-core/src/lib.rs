//! # keel-core
//!
//! Shared vocabulary for the Keel orchestration runtime support layer.
//!
//! Every other Keel crate depends on this one for:
//!
//! - **Ids**: [`EntryId`] newtype for audit entries (UUID v7, time-ordered)
//! - **Persistence boundary**: the [`ConfigStore`] and [`EventLogStore`] traits a
//!   host must supply, plus the row types that cross that boundary
//! - **In-memory handle**: [`MemoryPersistence`], a fault-injectable store for
//!   tests and embedded hosts
//! - **Errors**: [`PersistenceError`], the single failure type at the boundary
//! - **Logging**: [`logging::init_subscriber`] for hosts that want Keel's
//!   default `tracing` output
//!
//! [`ConfigStore`]: persistence::ConfigStore
//! [`EventLogStore`]: persistence::EventLogStore
//! [`MemoryPersistence`]: persistence::MemoryPersistence
//! [`PersistenceError`]: errors::PersistenceError

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod persistence;

pub use errors::PersistenceError;
pub use ids::EntryId;
pub use persistence::{
    ConfigRecord, ConfigStore, EventLogStore, EventQuery, EventRow, MemoryPersistence,
    PersistenceHandle,
};
