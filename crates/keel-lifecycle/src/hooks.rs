//! Hook callbacks, their context and their budgets.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use keel_core::PersistenceHandle;
use keel_settings::LifecycleSettings;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::service::HealthStatus;

/// Which lifecycle hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookKind {
    /// One-time setup with the persistence handle.
    Init,
    /// Begin serving.
    Start,
    /// Stop serving.
    Stop,
    /// Report health.
    Health,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "init",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Health => "health",
        })
    }
}

/// What a hook receives.
#[derive(Clone)]
pub struct HookContext {
    /// Handle given to the last `init`, if any.
    pub persistence: Option<Arc<dyn PersistenceHandle>>,
    /// Cancelled when the hook runs out of budget.
    pub cancel: CancellationToken,
}

impl fmt::Debug for HookContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContext")
            .field("has_persistence", &self.persistence.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

pub(crate) type HookFn<T> =
    Arc<dyn Fn(HookContext) -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

fn boxed<T, F, Fut>(f: F) -> HookFn<T>
where
    F: Fn(HookContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    Arc::new(move |ctx| f(ctx).boxed())
}

/// Optional hooks of a service.
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    pub(crate) init: Option<HookFn<()>>,
    pub(crate) start: Option<HookFn<()>>,
    pub(crate) stop: Option<HookFn<()>>,
    pub(crate) health: Option<HookFn<HealthStatus>>,
}

impl LifecycleHooks {
    /// No hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `init` hook.
    #[must_use]
    pub fn on_init<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.init = Some(boxed(f));
        self
    }

    /// Set the `start` hook.
    #[must_use]
    pub fn on_start<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.start = Some(boxed(f));
        self
    }

    /// Set the `stop` hook.
    #[must_use]
    pub fn on_stop<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.stop = Some(boxed(f));
        self
    }

    /// Set the `health` hook.
    #[must_use]
    pub fn on_health<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<HealthStatus>> + Send + 'static,
    {
        self.health = Some(boxed(f));
        self
    }

    /// Whether any hook is set.
    pub fn any(&self) -> bool {
        self.init.is_some() || self.start.is_some() || self.stop.is_some() || self.health.is_some()
    }
}

impl fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("init", &self.init.is_some())
            .field("start", &self.start.is_some())
            .field("stop", &self.stop.is_some())
            .field("health", &self.health.is_some())
            .finish()
    }
}

/// Per-hook budgets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HookTimeouts {
    /// `init` budget.
    pub init: Duration,
    /// `start` budget.
    pub start: Duration,
    /// `stop` budget.
    pub stop: Duration,
    /// `health` budget.
    pub health: Duration,
}

impl HookTimeouts {
    /// Budget for `hook`.
    pub fn for_hook(&self, hook: HookKind) -> Duration {
        match hook {
            HookKind::Init => self.init,
            HookKind::Start => self.start,
            HookKind::Stop => self.stop,
            HookKind::Health => self.health,
        }
    }
}

impl Default for HookTimeouts {
    fn default() -> Self {
        Self::from(&LifecycleSettings::default())
    }
}

impl From<&LifecycleSettings> for HookTimeouts {
    fn from(settings: &LifecycleSettings) -> Self {
        Self {
            init: settings.init_timeout(),
            start: settings.start_timeout(),
            stop: settings.stop_timeout(),
            health: settings.health_timeout(),
        }
    }
}
