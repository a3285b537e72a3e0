//! # keel-state
//!
//! Cache-first store for orchestrator execution state.
//!
//! [`StateStore`] keeps one [`StateEntry`] per entity in memory and writes it
//! through to a [`ConfigStore`](keel_core::ConfigStore):
//!
//! - **Saves** update the cache first, then attempt the upsert. A failed
//!   upsert is a warning, not an error: the cache is authoritative.
//! - **Loads** answer from the cache when they can and only read the backing
//!   store on a miss. Persisted entries older than the TTL (24h by default)
//!   are reported absent.
//! - **Versions** come from one counter shared by every entity, so a higher
//!   version always means a later save within this store.

#![deny(unsafe_code)]

pub mod errors;
pub mod store;
pub mod types;

pub use errors::{StateError, StateWarning};
pub use store::StateStore;
pub use types::{
    ClearReceipt, LoadOptions, LoadedState, SaveOptions, SaveReceipt, StateEntry, StateSource,
};
