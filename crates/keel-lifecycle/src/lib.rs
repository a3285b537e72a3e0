//! # keel-lifecycle
//!
//! Lifecycle control for orchestrator services.
//!
//! - **Services**: [`create_lifecycle_service`] wraps a named execution
//!   function plus optional `init`/`start`/`stop`/`health` hooks into a
//!   [`LifecycleService`] with uniform methods. Absent hooks are no-ops.
//! - **Budgets**: every hook runs under a timeout ([`HookTimeouts`]). On
//!   timeout the hook's [`CancellationToken`](tokio_util::sync::CancellationToken)
//!   is cancelled and its future dropped.
//! - **Registry**: [`ServiceRegistry`] keeps services in registration order;
//!   [`initialize_all`], [`start_all`], [`stop_all`] and [`health_check_all`]
//!   walk it with per-service failure isolation.

#![deny(unsafe_code)]

pub mod bulk;
pub mod errors;
pub mod hooks;
pub mod registry;
pub mod service;

pub use bulk::{
    HealthSummary, InitializeOptions, InitializeSummary, OverallHealth, ServiceFailure,
    ServiceHealth, StartSummary, StopSummary, health_check_all, initialize_all, start_all, stop_all,
};
pub use errors::LifecycleError;
pub use hooks::{HookContext, HookKind, HookTimeouts, LifecycleHooks};
pub use registry::{ServiceRegistry, ServiceSource};
pub use service::{
    HealthReport, HealthStatus, HookPresence, LifecycleService, ServiceConfig, ServiceDescriptor,
    create_lifecycle_service,
};
