//! Name-keyed service registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::service::Service;

/// Concurrency-safe collection of registered services.
///
/// A single mutex guards the map. It is held only for the map access
/// itself; service methods are always called on a snapshot.
#[derive(Default)]
pub struct ServiceRegistry {
    services: Mutex<HashMap<String, Arc<dyn Service>>>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn Service>>> {
        self.services.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a service. A service already registered under the same
    /// name is replaced and returned.
    pub fn add(&self, service: Arc<dyn Service>) -> Option<Arc<dyn Service>> {
        let name = service.name().to_string();
        let previous = self.map().insert(name.clone(), service);
        if previous.is_some() {
            tracing::debug!(service = %name, "Service replaced");
        }
        previous
    }

    /// Look up a service by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.map().get(name).cloned()
    }

    /// Point-in-time copy of every registered service.
    pub fn snapshot(&self) -> Vec<Arc<dyn Service>> {
        self.map().values().cloned().collect()
    }

    /// Registered service names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.map().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.map().len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.names())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::service::ServiceError;
    use async_trait::async_trait;
    use axum::Router;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Minimal service used across unit tests.
    pub(crate) struct FakeService {
        pub name: String,
        pub ready: AtomicBool,
        pub closed: AtomicUsize,
    }

    impl FakeService {
        pub(crate) fn new(name: &str, ready: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                ready: AtomicBool::new(ready),
                closed: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Service for FakeService {
        fn name(&self) -> &str {
            &self.name
        }

        fn register(&self, router: Router) -> Router {
            router
        }

        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        async fn close(&self) -> Result<(), ServiceError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn same_name_last_writer_wins() {
        let registry = ServiceRegistry::new();
        assert!(registry.add(FakeService::new("a", false)).is_none());
        let replaced = registry.add(FakeService::new("a", true));

        assert!(!replaced.unwrap().is_ready());
        assert_eq!(registry.len(), 1);
        assert!(registry.get("a").unwrap().is_ready());
        assert_eq!(registry.names(), vec!["a".to_string()]);
    }

    #[test]
    fn lookup_by_name() {
        let registry = ServiceRegistry::new();
        registry.add(FakeService::new("alpha", true));
        registry.add(FakeService::new("beta", false));

        assert_eq!(registry.get("beta").unwrap().name(), "beta");
        assert!(registry.get("gamma").is_none());
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[test]
    fn concurrent_registration() {
        let registry = Arc::new(ServiceRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry.add(FakeService::new(&format!("svc-{i}"), true));
                    registry.get(&format!("svc-{i}")).is_some()
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(registry.len(), 8);
    }
}
