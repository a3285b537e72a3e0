//! [`SupportLayer`]: the facilities a host process holds for its lifetime.

use std::sync::Arc;

use keel_audit::{AuditError, AuditTrail};
use keel_core::{ConfigStore, EventLogStore, PersistenceHandle};
use keel_lifecycle::{
    InitializeOptions, InitializeSummary, ServiceRegistry, StopSummary, initialize_all, stop_all,
};
use keel_persistence::SqlitePersistence;
use keel_settings::{KeelSettings, LoggingSettings};
use keel_state::StateStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::Result;

/// What [`SupportLayer::shutdown`] did.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Services stopped, and the ones whose stop hook failed.
    pub stop: StopSummary,
    /// Audit entries written by the final flush.
    pub flushed: usize,
    /// Why the final flush failed, if it did.
    pub flush_error: Option<AuditError>,
    /// Audit entries still buffered after the flush.
    pub audit_buffered: usize,
}

impl ShutdownReport {
    /// Whether every service stopped and the audit buffer is empty.
    pub fn is_clean(&self) -> bool {
        self.stop.failed.is_empty() && self.flush_error.is_none() && self.audit_buffered == 0
    }
}

/// State store, audit trail, service registry and persistence handle.
pub struct SupportLayer {
    state: StateStore,
    audit: AuditTrail,
    registry: ServiceRegistry,
    persistence: Option<Arc<dyn PersistenceHandle>>,
    shutdown: CancellationToken,
}

impl SupportLayer {
    /// Build the facilities from `settings` without a persistence handle.
    pub fn from_settings(settings: &KeelSettings) -> Self {
        Self {
            state: StateStore::new(settings.state.clone()),
            audit: AuditTrail::new(settings.audit.clone()),
            registry: ServiceRegistry::new(),
            persistence: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Build the facilities and open the `SQLite` database at
    /// `storage.dbPath`.
    pub fn open(settings: &KeelSettings) -> Result<Self> {
        settings.validate()?;
        let db = SqlitePersistence::open(&settings.storage)?;
        info!(path = %settings.storage.db_path, "support layer opened");
        Ok(Self::from_settings(settings).with_persistence(Arc::new(db)))
    }

    /// Load settings from the default layers, then [`open`](Self::open).
    pub fn open_default() -> Result<Self> {
        let settings = keel_settings::load_settings()?;
        Self::open(&settings)
    }

    /// Use `persistence` as the handle for every facility.
    #[must_use]
    pub fn with_persistence(mut self, persistence: Arc<dyn PersistenceHandle>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Install the tracing subscriber described by `logging`.
    pub fn init_logging(logging: &LoggingSettings) {
        if logging.json {
            keel_core::logging::init_json_subscriber(&logging.level);
        } else {
            keel_core::logging::init_subscriber(&logging.level);
        }
    }

    /// The state store.
    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// The audit trail.
    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    /// The service registry.
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// The shared persistence handle.
    pub fn persistence(&self) -> Option<Arc<dyn PersistenceHandle>> {
        self.persistence.clone()
    }

    /// The persistence handle as a config store, for the state store.
    pub fn config_store(&self) -> Option<&dyn ConfigStore> {
        self.persistence.as_deref().map(|p| p as &dyn ConfigStore)
    }

    /// The persistence handle as an event log, for the audit trail.
    pub fn event_log(&self) -> Option<&dyn EventLogStore> {
        self.persistence.as_deref().map(|p| p as &dyn EventLogStore)
    }

    /// Cancelled once [`shutdown`](Self::shutdown) begins.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Initialize every registered service with this layer's handle.
    pub async fn initialize_services(&self, options: &InitializeOptions) -> InitializeSummary {
        initialize_all(&self.registry, self.persistence(), options).await
    }

    /// Stop every service in reverse registration order, then flush the
    /// audit buffer.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.shutdown.cancel();
        let stop = stop_all(&self.registry).await;

        let (flushed, flush_error) = match self.event_log() {
            Some(log) => match self.audit.flush(log).await {
                Ok(n) => (n, None),
                Err(e) => {
                    warn!(error = %e, "final audit flush failed");
                    (0, Some(e))
                }
            },
            None => (0, None),
        };

        let report = ShutdownReport {
            stop,
            flushed,
            flush_error,
            audit_buffered: self.audit.buffer_size(),
        };
        if report.audit_buffered > 0 {
            warn!(buffered = report.audit_buffered, "audit entries lost at shutdown");
        }
        info!(
            stopped = report.stop.stopped.len(),
            stop_failures = report.stop.failed.len(),
            flushed = report.flushed,
            "support layer shut down"
        );
        report
    }
}

impl std::fmt::Debug for SupportLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupportLayer")
            .field("state", &self.state)
            .field("audit", &self.audit)
            .field("registry", &self.registry)
            .field("has_persistence", &self.persistence.is_some())
            .finish()
    }
}
