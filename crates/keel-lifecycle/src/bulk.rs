//! Registry-wide lifecycle operations.
//!
//! Each operation isolates failures per service: one service failing or
//! timing out never stops the others from being attempted.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use keel_core::PersistenceHandle;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::errors::LifecycleError;
use crate::registry::ServiceSource;
use crate::service::HealthStatus;

/// Options for [`initialize_all`].
#[derive(Clone, Debug, Default)]
pub struct InitializeOptions {
    /// Overrides every service's `init` budget.
    pub timeout: Option<Duration>,
}

/// A service that failed a bulk operation.
#[derive(Debug)]
pub struct ServiceFailure {
    /// Service name.
    pub name: String,
    /// Why it failed.
    pub error: LifecycleError,
}

/// Result of [`initialize_all`].
#[derive(Debug, Default)]
pub struct InitializeSummary {
    /// Services whose `init` succeeded, in order.
    pub initialized: Vec<String>,
    /// Services whose `init` failed or timed out.
    pub failed: Vec<ServiceFailure>,
    /// Services without an `init` hook.
    pub skipped: Vec<String>,
}

/// Result of [`start_all`].
#[derive(Debug, Default)]
pub struct StartSummary {
    /// Services started, in order.
    pub started: Vec<String>,
    /// Services whose `start` failed or timed out.
    pub failed: Vec<ServiceFailure>,
    /// Services with an `init` hook that have not been initialized.
    pub skipped: Vec<String>,
}

/// Result of [`stop_all`].
#[derive(Debug, Default)]
pub struct StopSummary {
    /// Services stopped cleanly, in stop order.
    pub stopped: Vec<String>,
    /// Services whose `stop` hook failed. They are still uninitialized.
    pub failed: Vec<ServiceFailure>,
}

/// Aggregate health of a registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallHealth {
    /// Every service is healthy.
    Healthy,
    /// At least one degraded, none unhealthy.
    Degraded,
    /// At least one unhealthy.
    Unhealthy,
    /// No registry, or no services.
    Unknown,
}

impl OverallHealth {
    /// Worst status wins: unhealthy, then degraded, then healthy.
    pub fn aggregate(statuses: impl IntoIterator<Item = HealthStatus>) -> Self {
        let mut overall = Self::Unknown;
        for status in statuses {
            overall = match (overall, status) {
                (_, HealthStatus::Unhealthy) | (Self::Unhealthy, _) => Self::Unhealthy,
                (_, HealthStatus::Degraded) | (Self::Degraded, _) => Self::Degraded,
                _ => Self::Healthy,
            };
        }
        overall
    }
}

impl std::fmt::Display for OverallHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        })
    }
}

/// One service's line in a [`HealthSummary`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealth {
    /// Service name.
    pub name: String,
    /// Reported status.
    pub status: HealthStatus,
    /// Time spent in the health hook.
    pub latency_ms: u64,
    /// Hook error or timeout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of [`health_check_all`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSummary {
    /// Per-service health, in registry order.
    pub services: Vec<ServiceHealth>,
    /// Aggregate.
    pub overall: OverallHealth,
}

/// Run `init` on every service that has an `init` hook, in order.
#[instrument(skip_all)]
pub async fn initialize_all(
    registry: &dyn ServiceSource,
    persistence: Option<Arc<dyn PersistenceHandle>>,
    options: &InitializeOptions,
) -> InitializeSummary {
    let mut summary = InitializeSummary::default();
    for service in registry.list_all() {
        let name = service.name().to_string();
        if !service.hook_presence().init {
            summary.skipped.push(name);
            continue;
        }
        match service
            .init_with_timeout(persistence.clone(), options.timeout)
            .await
        {
            Ok(()) => summary.initialized.push(name),
            Err(error) => {
                warn!(service = %name, error = %error, "service init failed");
                summary.failed.push(ServiceFailure { name, error });
            }
        }
    }
    info!(
        initialized = summary.initialized.len(),
        failed = summary.failed.len(),
        skipped = summary.skipped.len(),
        "initialize_all complete"
    );
    summary
}

/// Check every service's health concurrently.
///
/// Without a registry, or with an empty one, the overall status is
/// [`OverallHealth::Unknown`].
#[instrument(skip_all)]
pub async fn health_check_all(registry: Option<&dyn ServiceSource>) -> HealthSummary {
    let services = registry.map(|r| r.list_all()).unwrap_or_default();
    let reports = join_all(services.iter().map(|s| s.health())).await;

    let services: Vec<ServiceHealth> = services
        .iter()
        .zip(reports)
        .map(|(service, report)| ServiceHealth {
            name: service.name().to_string(),
            status: report.status,
            latency_ms: report.latency_ms,
            error: report.error,
        })
        .collect();
    let overall = OverallHealth::aggregate(services.iter().map(|s| s.status));

    HealthSummary { services, overall }
}

/// Start every service that is initialized or has no `init` hook, in order.
#[instrument(skip_all)]
pub async fn start_all(registry: &dyn ServiceSource) -> StartSummary {
    let mut summary = StartSummary::default();
    for service in registry.list_all() {
        let name = service.name().to_string();
        if service.hook_presence().init && !service.is_initialized() {
            summary.skipped.push(name);
            continue;
        }
        match service.start().await {
            Ok(()) => summary.started.push(name),
            Err(error) => {
                warn!(service = %name, error = %error, "service start failed");
                summary.failed.push(ServiceFailure { name, error });
            }
        }
    }
    summary
}

/// Stop every service in reverse registration order.
#[instrument(skip_all)]
pub async fn stop_all(registry: &dyn ServiceSource) -> StopSummary {
    let mut summary = StopSummary::default();
    for service in registry.list_all().into_iter().rev() {
        let name = service.name().to_string();
        match service.stop().await {
            Ok(()) => summary.stopped.push(name),
            Err(error) => {
                warn!(service = %name, error = %error, "service stop failed");
                summary.failed.push(ServiceFailure { name, error });
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::LifecycleHooks;
    use crate::registry::ServiceRegistry;
    use crate::service::{LifecycleService, ServiceConfig, create_lifecycle_service};
    use keel_core::MemoryPersistence;
    use parking_lot::Mutex;

    fn svc(name: &str, hooks: LifecycleHooks) -> LifecycleService {
        create_lifecycle_service(
            ServiceConfig::new(name, |input| async move { anyhow::Ok(input) }).lifecycle(hooks),
        )
        .unwrap()
    }

    fn with_health(status: HealthStatus) -> LifecycleHooks {
        LifecycleHooks::new().on_health(move |_| async move { anyhow::Ok(status) })
    }

    #[test]
    fn aggregate_precedence() {
        use HealthStatus::{Degraded, Healthy, Unhealthy};
        assert_eq!(OverallHealth::aggregate([]), OverallHealth::Unknown);
        assert_eq!(OverallHealth::aggregate([Healthy, Healthy]), OverallHealth::Healthy);
        assert_eq!(OverallHealth::aggregate([Healthy, Degraded]), OverallHealth::Degraded);
        assert_eq!(OverallHealth::aggregate([Healthy, Unhealthy]), OverallHealth::Unhealthy);
        assert_eq!(OverallHealth::aggregate([Unhealthy, Degraded]), OverallHealth::Unhealthy);
    }

    #[tokio::test]
    async fn empty_or_missing_registry_is_unknown() {
        let registry = ServiceRegistry::new();
        let summary = health_check_all(Some(&registry)).await;
        assert!(summary.services.is_empty());
        assert_eq!(summary.overall, OverallHealth::Unknown);

        let summary = health_check_all(None).await;
        assert_eq!(summary.overall, OverallHealth::Unknown);
    }

    #[tokio::test]
    async fn health_summary_keeps_registry_order() {
        let registry = ServiceRegistry::new();
        let _ = registry.register(svc("a", with_health(HealthStatus::Healthy)));
        let _ = registry.register(svc("b", with_health(HealthStatus::Degraded)));
        let _ = registry.register(svc("c", LifecycleHooks::new()));

        let summary = health_check_all(Some(&registry)).await;
        let names: Vec<&str> = summary.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(summary.services[2].status, HealthStatus::Healthy);
        assert_eq!(summary.overall, OverallHealth::Degraded);
    }

    #[tokio::test]
    async fn unhealthy_dominates() {
        let registry = ServiceRegistry::new();
        let _ = registry.register(svc("a", with_health(HealthStatus::Healthy)));
        let _ = registry.register(svc(
            "b",
            LifecycleHooks::new().on_health(|_| async { anyhow::bail!("down") }),
        ));
        let summary = health_check_all(Some(&registry)).await;
        assert_eq!(summary.overall, OverallHealth::Unhealthy);
        assert!(summary.services[1].error.is_some());
    }

    #[tokio::test]
    async fn panicking_health_hook_is_isolated() {
        fn check() -> anyhow::Result<HealthStatus> {
            panic!("hook bug")
        }
        let registry = Arc::new(ServiceRegistry::new());
        let _ = registry.register(svc("ok", with_health(HealthStatus::Healthy)));
        let _ = registry.register(svc(
            "bad",
            LifecycleHooks::new().on_health(|_| async { check() }),
        ));

        let shared = registry.clone();
        let summary = tokio::spawn(async move { health_check_all(Some(&*shared)).await })
            .await
            .unwrap();
        assert_eq!(summary.services.len(), 2);
        assert_eq!(summary.services[0].status, HealthStatus::Healthy);
        assert_eq!(summary.services[1].status, HealthStatus::Unhealthy);
        assert!(summary.services[1].error.as_deref().unwrap().contains("hook bug"));
        assert_eq!(summary.overall, OverallHealth::Unhealthy);
    }

    #[tokio::test]
    async fn panicking_init_hook_does_not_stop_later_services() {
        fn boot() -> anyhow::Result<()> {
            panic!("init bug")
        }
        let registry = ServiceRegistry::new();
        let _ = registry.register(svc("bad", LifecycleHooks::new().on_init(|_| async { boot() })));
        let _ = registry.register(svc(
            "good",
            LifecycleHooks::new().on_init(|_| async { anyhow::Ok(()) }),
        ));

        let summary = initialize_all(&registry, None, &InitializeOptions::default()).await;
        assert_eq!(summary.initialized, ["good"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].name, "bad");
        assert!(summary.failed[0].error.to_string().contains("hook panicked"));
    }

    #[tokio::test]
    async fn init_failure_is_isolated() {
        let registry = ServiceRegistry::new();
        let _ = registry.register(svc(
            "a",
            LifecycleHooks::new().on_init(|_| async { anyhow::bail!("boom") }),
        ));
        let _ = registry.register(svc(
            "b",
            LifecycleHooks::new().on_init(|_| async { anyhow::Ok(()) }),
        ));
        let _ = registry.register(svc("c", LifecycleHooks::new()));

        let db: Arc<dyn PersistenceHandle> = Arc::new(MemoryPersistence::new());
        let summary = initialize_all(&registry, Some(db), &InitializeOptions::default()).await;
        assert_eq!(summary.initialized, ["b"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].name, "a");
        assert_eq!(summary.skipped, ["c"]);
        assert!(registry.get("b").unwrap().is_initialized());
        assert!(!registry.get("a").unwrap().is_initialized());
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_timeout_override() {
        let registry = ServiceRegistry::new();
        let _ = registry.register(svc(
            "slow",
            LifecycleHooks::new().on_init(|_| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                anyhow::Ok(())
            }),
        ));
        let options = InitializeOptions {
            timeout: Some(Duration::from_secs(1)),
        };
        let summary = initialize_all(&registry, None, &options).await;
        assert!(summary.initialized.is_empty());
        assert!(summary.failed[0].error.is_timeout());
    }

    #[tokio::test]
    async fn start_all_skips_uninitialized() {
        let registry = ServiceRegistry::new();
        let _ = registry.register(svc(
            "needs-init",
            LifecycleHooks::new().on_init(|_| async { anyhow::Ok(()) }),
        ));
        let _ = registry.register(svc("plain", LifecycleHooks::new()));

        let summary = start_all(&registry).await;
        assert_eq!(summary.started, ["plain"]);
        assert_eq!(summary.skipped, ["needs-init"]);

        let _ = initialize_all(&registry, None, &InitializeOptions::default()).await;
        let summary = start_all(&registry).await;
        assert_eq!(summary.started, ["needs-init", "plain"]);
    }

    #[tokio::test]
    async fn stop_all_runs_in_reverse_and_resets() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let registry = ServiceRegistry::new();
        for name in ["a", "b", "c"] {
            let order = order.clone();
            let hooks = LifecycleHooks::new()
                .on_init(|_| async { anyhow::Ok(()) })
                .on_stop(move |_| {
                    order.lock().push(name);
                    async move {
                        if name == "b" {
                            anyhow::bail!("stuck");
                        }
                        Ok(())
                    }
                });
            let _ = registry.register(svc(name, hooks));
        }
        let _ = initialize_all(&registry, None, &InitializeOptions::default()).await;

        let summary = stop_all(&registry).await;
        assert_eq!(*order.lock(), ["c", "b", "a"]);
        assert_eq!(summary.stopped, ["c", "a"]);
        assert_eq!(summary.failed[0].name, "b");
        assert!(registry.list_all().iter().all(|s| !s.is_initialized()));
    }
}
