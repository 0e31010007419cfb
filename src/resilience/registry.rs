//! Keyed store of circuit breakers, one per upstream service name.
//!
//! The registry is constructed explicitly and handed to callers (the gateway
//! keeps one in `AppState`) instead of living in a process-wide static.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::clock::{Clock, SystemClock};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics};

/// Thread-safe registry of circuit breakers.
#[derive(Debug, Clone)]
pub struct CircuitBreakerRegistry {
    breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Registry whose breakers all read `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            breakers: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Return the breaker named `config.name`, creating it on first access.
    /// The configuration of later calls is ignored.
    pub fn get_or_create(&self, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(&config.name) {
            return existing.value().clone();
        }

        self.breakers
            .entry(config.name.clone())
            .or_insert_with(|| {
                tracing::debug!(name = %config.name, "Creating circuit breaker");
                Arc::new(CircuitBreaker::with_clock(config, self.clock.clone()))
            })
            .value()
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|r| r.value().clone())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Reset every registered breaker to Closed.
    pub fn reset_all(&self) {
        for r in self.breakers.iter() {
            r.value().reset();
        }
        tracing::info!(count = self.breakers.len(), "All circuit breakers reset");
    }

    /// Metrics for every registered breaker, keyed by name.
    pub fn all_metrics(&self) -> BTreeMap<String, CircuitBreakerMetrics> {
        self.breakers
            .iter()
            .map(|r| (r.key().clone(), r.value().metrics()))
            .collect()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::resilience::circuit_breaker::CircuitState;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let registry = CircuitBreakerRegistry::new();
        let first = registry.get_or_create(CircuitBreakerConfig::new("shopify").with_failure_threshold(2));
        let second = registry.get_or_create(CircuitBreakerConfig::new("shopify").with_failure_threshold(9));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.config().failure_threshold, 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_and_names() {
        let registry = CircuitBreakerRegistry::new();
        assert!(registry.is_empty());
        registry.get_or_create(CircuitBreakerConfig::new("wave"));
        registry.get_or_create(CircuitBreakerConfig::new("hubspot"));

        assert!(registry.get("wave").is_some());
        assert!(registry.get("stripe").is_none());
        assert_eq!(registry.names(), vec!["hubspot".to_string(), "wave".to_string()]);
    }

    #[tokio::test]
    async fn test_bulk_reset_and_metrics() {
        let clock = Arc::new(ManualClock::new(0));
        let registry = CircuitBreakerRegistry::with_clock(clock);
        let a = registry.get_or_create(CircuitBreakerConfig::new("a").with_failure_threshold(1));
        let b = registry.get_or_create(CircuitBreakerConfig::new("b").with_failure_threshold(1));

        let _ = a.execute(|| async { Err::<(), _>("down") }).await;
        let _ = b.execute(|| async { Err::<(), _>("down") }).await;

        let metrics = registry.all_metrics();
        assert_eq!(metrics.len(), 2);
        assert!(metrics.values().all(|m| m.state == CircuitState::Open));

        registry.reset_all();
        assert!(registry
            .all_metrics()
            .values()
            .all(|m| m.state == CircuitState::Closed && m.failure_count == 0));
    }
}
