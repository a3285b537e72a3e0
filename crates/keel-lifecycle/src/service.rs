//! [`LifecycleService`]: a named service with budgeted lifecycle hooks.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use keel_core::PersistenceHandle;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::errors::LifecycleError;
use crate::hooks::{HookContext, HookFn, HookKind, HookTimeouts, LifecycleHooks};

type ExecuteFn = Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Health reported by a service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Fully operational.
    Healthy,
    /// Operational with reduced capability.
    Degraded,
    /// Not operational.
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        })
    }
}

/// Result of [`LifecycleService::health`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Reported status.
    pub status: HealthStatus,
    /// Time spent in the health hook.
    pub latency_ms: u64,
    /// Hook error or timeout, when unhealthy for that reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Which hooks a service has.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookPresence {
    /// `init` hook present.
    pub init: bool,
    /// `start` hook present.
    pub start: bool,
    /// `stop` hook present.
    pub stop: bool,
    /// `health` hook present.
    pub health: bool,
}

/// Snapshot of a service's identity and lifecycle state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    /// Service name.
    pub name: String,
    /// Declared capabilities.
    pub capabilities: Vec<String>,
    /// Pipeline stages served.
    pub stages: Vec<u32>,
    /// Hook presence.
    pub hooks: HookPresence,
    /// Whether any hook is present.
    pub has_lifecycle: bool,
    /// Whether `init` has succeeded since the last `stop`.
    pub initialized: bool,
}

/// Input to [`create_lifecycle_service`].
pub struct ServiceConfig {
    name: String,
    capabilities: Vec<String>,
    stages: Vec<u32>,
    execute: ExecuteFn,
    hooks: LifecycleHooks,
    timeouts: HookTimeouts,
}

impl ServiceConfig {
    /// A service named `name` that runs `execute`.
    pub fn new<F, Fut>(name: impl Into<String>, execute: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            capabilities: Vec::new(),
            stages: Vec::new(),
            execute: Arc::new(move |input| execute(input).boxed()),
            hooks: LifecycleHooks::default(),
            timeouts: HookTimeouts::default(),
        }
    }

    /// Declared capabilities.
    #[must_use]
    pub fn capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Pipeline stages served.
    #[must_use]
    pub fn stages(mut self, stages: impl IntoIterator<Item = u32>) -> Self {
        self.stages = stages.into_iter().collect();
        self
    }

    /// Lifecycle hooks.
    #[must_use]
    pub fn lifecycle(mut self, hooks: LifecycleHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Hook budgets.
    #[must_use]
    pub fn timeouts(mut self, timeouts: HookTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("name", &self.name)
            .field("hooks", &self.hooks)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

/// Build a service from `config`.
///
/// Fails only when the name is empty.
pub fn create_lifecycle_service(config: ServiceConfig) -> Result<LifecycleService, LifecycleError> {
    if config.name.trim().is_empty() {
        return Err(LifecycleError::Misconfigured("service name is empty".into()));
    }
    debug!(name = %config.name, hooks = ?config.hooks, "creating lifecycle service");
    Ok(LifecycleService {
        name: config.name,
        capabilities: config.capabilities,
        stages: config.stages,
        execute: config.execute,
        hooks: config.hooks,
        timeouts: config.timeouts,
        initialized: AtomicBool::new(false),
        persistence: Mutex::new(None),
    })
}

/// A named service with uniform lifecycle methods.
///
/// Every method is callable whether or not the matching hook exists.
pub struct LifecycleService {
    name: String,
    capabilities: Vec<String>,
    stages: Vec<u32>,
    execute: ExecuteFn,
    hooks: LifecycleHooks,
    timeouts: HookTimeouts,
    initialized: AtomicBool,
    persistence: Mutex<Option<Arc<dyn PersistenceHandle>>>,
}

impl LifecycleService {
    /// Service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether any hook is present.
    pub fn has_lifecycle(&self) -> bool {
        self.hooks.any()
    }

    /// Whether `init` has succeeded since the last `stop`.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Which hooks are present.
    pub fn hook_presence(&self) -> HookPresence {
        HookPresence {
            init: self.hooks.init.is_some(),
            start: self.hooks.start.is_some(),
            stop: self.hooks.stop.is_some(),
            health: self.hooks.health.is_some(),
        }
    }

    /// Snapshot of this service.
    pub fn descriptor(&self) -> ServiceDescriptor {
        ServiceDescriptor {
            name: self.name.clone(),
            capabilities: self.capabilities.clone(),
            stages: self.stages.clone(),
            hooks: self.hook_presence(),
            has_lifecycle: self.has_lifecycle(),
            initialized: self.is_initialized(),
        }
    }

    /// Run the execution function.
    pub async fn execute(&self, input: Value) -> anyhow::Result<Value> {
        (self.execute)(input).await
    }

    /// Run the `init` hook with `persistence`.
    pub async fn init(
        &self,
        persistence: Option<Arc<dyn PersistenceHandle>>,
    ) -> Result<(), LifecycleError> {
        self.init_with_timeout(persistence, None).await
    }

    /// Run the `init` hook, optionally overriding its budget.
    ///
    /// Without an `init` hook this does nothing and the service stays
    /// uninitialized. The handle is kept for later hooks either way.
    #[instrument(skip_all, fields(service = %self.name))]
    pub async fn init_with_timeout(
        &self,
        persistence: Option<Arc<dyn PersistenceHandle>>,
        budget: Option<Duration>,
    ) -> Result<(), LifecycleError> {
        *self.persistence.lock() = persistence;
        let Some(hook) = &self.hooks.init else {
            return Ok(());
        };
        let budget = budget.unwrap_or(self.timeouts.init);
        self.run_hook(HookKind::Init, budget, hook).await?;
        self.initialized.store(true, Ordering::SeqCst);
        info!("service initialized");
        Ok(())
    }

    /// Run the `start` hook.
    #[instrument(skip_all, fields(service = %self.name))]
    pub async fn start(&self) -> Result<(), LifecycleError> {
        let Some(hook) = &self.hooks.start else {
            return Ok(());
        };
        self.run_hook(HookKind::Start, self.timeouts.start, hook).await
    }

    /// Run the `stop` hook. The service is uninitialized afterwards even if
    /// the hook fails.
    #[instrument(skip_all, fields(service = %self.name))]
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        let result = match &self.hooks.stop {
            Some(hook) => self.run_hook(HookKind::Stop, self.timeouts.stop, hook).await,
            None => Ok(()),
        };
        self.initialized.store(false, Ordering::SeqCst);
        result
    }

    /// Run the `health` hook. Never fails: errors, panics and timeouts
    /// become [`HealthStatus::Unhealthy`].
    #[instrument(skip_all, fields(service = %self.name))]
    pub async fn health(&self) -> HealthReport {
        let Some(hook) = &self.hooks.health else {
            return HealthReport {
                status: HealthStatus::Healthy,
                latency_ms: 0,
                error: None,
            };
        };

        let started = Instant::now();
        let result = self.run_hook(HookKind::Health, self.timeouts.health, hook).await;
        let latency_ms = millis(started.elapsed());
        match result {
            Ok(status) => HealthReport {
                status,
                latency_ms,
                error: None,
            },
            Err(e) => HealthReport {
                status: HealthStatus::Unhealthy,
                latency_ms,
                error: Some(e.to_string()),
            },
        }
    }

    fn context(&self, cancel: CancellationToken) -> HookContext {
        HookContext {
            persistence: self.persistence.lock().clone(),
            cancel,
        }
    }

    async fn run_hook<T>(
        &self,
        hook: HookKind,
        budget: Duration,
        f: &HookFn<T>,
    ) -> Result<T, LifecycleError> {
        let cancel = CancellationToken::new();
        let ctx = self.context(cancel.clone());
        let fut = match panic::catch_unwind(AssertUnwindSafe(|| f(ctx))) {
            Ok(fut) => AssertUnwindSafe(fut).catch_unwind(),
            Err(payload) => return Err(self.panicked(hook, payload.as_ref())),
        };

        tokio::select! {
            outcome = fut => match outcome {
                Ok(result) => result.map_err(|e| {
                    warn!(hook = %hook, error = %e, "hook failed");
                    LifecycleError::Hook {
                        service: self.name.clone(),
                        hook,
                        message: format!("{e:#}"),
                    }
                }),
                Err(payload) => Err(self.panicked(hook, payload.as_ref())),
            },
            () = tokio::time::sleep(budget) => {
                cancel.cancel();
                let timeout_ms = millis(budget);
                warn!(hook = %hook, timeout_ms, "hook timed out");
                Err(LifecycleError::Timeout {
                    service: self.name.clone(),
                    hook,
                    timeout_ms,
                })
            }
        }
    }

    fn panicked(&self, hook: HookKind, payload: &(dyn Any + Send)) -> LifecycleError {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        warn!(hook = %hook, reason = %reason, "hook panicked");
        LifecycleError::Hook {
            service: self.name.clone(),
            hook,
            message: format!("hook panicked: {reason}"),
        }
    }
}

impl std::fmt::Debug for LifecycleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleService")
            .field("name", &self.name)
            .field("hooks", &self.hooks)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
