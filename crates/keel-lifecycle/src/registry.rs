//! Service registry.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::service::LifecycleService;

/// Anything that can list services for the bulk operations.
pub trait ServiceSource: Send + Sync {
    /// Every service, in registration order.
    fn list_all(&self) -> Vec<Arc<LifecycleService>>;
}

/// Ordered, name-unique collection of services.
///
/// Registering a name that already exists replaces the old service in
/// place, so the registration order of the name is kept.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<Vec<Arc<LifecycleService>>>,
}

impl ServiceRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `service`, replacing any service with the same name. Returns the
    /// shared handle.
    pub fn register(&self, service: LifecycleService) -> Arc<LifecycleService> {
        let service = Arc::new(service);
        let mut services = self.services.write();
        if let Some(slot) = services.iter_mut().find(|s| s.name() == service.name()) {
            debug!(name = %service.name(), "replacing registered service");
            *slot = service.clone();
        } else {
            debug!(name = %service.name(), "registering service");
            services.push(service.clone());
        }
        service
    }

    /// Remove a service by name. Returns `true` if it was registered.
    pub fn unregister(&self, name: &str) -> bool {
        let mut services = self.services.write();
        let before = services.len();
        services.retain(|s| s.name() != name);
        services.len() != before
    }

    /// Look up a service by name.
    pub fn get(&self, name: &str) -> Option<Arc<LifecycleService>> {
        self.services.read().iter().find(|s| s.name() == name).cloned()
    }

    /// Registered service names, in order.
    pub fn names(&self) -> Vec<String> {
        self.services.read().iter().map(|s| s.name().to_string()).collect()
    }

    /// Number of registered services.
    pub fn count(&self) -> usize {
        self.services.read().len()
    }

    /// Remove every service.
    pub fn clear(&self) {
        self.services.write().clear();
    }
}

impl ServiceSource for ServiceRegistry {
    fn list_all(&self) -> Vec<Arc<LifecycleService>> {
        self.services.read().clone()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.names())
            .finish()
    }
}
