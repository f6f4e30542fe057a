//! Aggregated readiness over the service registry.

use std::sync::Arc;

use crate::service::ServiceRegistry;

/// Combines per-service readiness into one signal.
#[derive(Debug, Clone)]
pub struct ReadinessAggregator {
    registry: Arc<ServiceRegistry>,
}

impl ReadinessAggregator {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry }
    }

    /// True iff every registered service reports ready.
    pub fn is_ready(&self) -> bool {
        self.registry.snapshot().iter().all(|service| service.is_ready())
    }

    /// Names of services currently reporting not ready, sorted.
    pub fn pending(&self) -> Vec<String> {
        let mut pending: Vec<String> = self
            .registry
            .snapshot()
            .iter()
            .filter(|service| !service.is_ready())
            .map(|service| service.name().to_string())
            .collect();
        pending.sort();
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::registry::tests::FakeService;
    use std::sync::atomic::Ordering;

    #[test]
    fn empty_registry_is_ready() {
        let aggregator = ReadinessAggregator::new(Arc::new(ServiceRegistry::new()));
        assert!(aggregator.is_ready());
        assert!(aggregator.pending().is_empty());
    }

    #[test]
    fn every_combination_of_three_services() {
        for mask in 0u8..8 {
            let registry = Arc::new(ServiceRegistry::new());
            for i in 0..3 {
                registry.add(FakeService::new(&format!("s{i}"), mask & (1 << i) != 0));
            }
            let aggregator = ReadinessAggregator::new(registry);
            assert_eq!(aggregator.is_ready(), mask == 0b111, "mask {mask:03b}");
        }
    }

    #[test]
    fn follows_service_transitions_without_caching() {
        let registry = Arc::new(ServiceRegistry::new());
        let a = FakeService::new("a", true);
        let b = FakeService::new("b", false);
        registry.add(a);
        registry.add(b.clone());

        let aggregator = ReadinessAggregator::new(registry);
        assert!(!aggregator.is_ready());
        assert_eq!(aggregator.pending(), vec!["b".to_string()]);

        b.ready.store(true, Ordering::SeqCst);
        assert!(aggregator.is_ready());
    }
}
