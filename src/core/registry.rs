//! Process-wide named-breaker directory.
//!
//! Unrelated call sites that share a logical downstream resource (the same
//! model server, the same accelerator) should share one breaker's learned
//! state. The registry hands out `Arc`s keyed by name. It is an explicitly
//! constructed object passed by reference to collaborators, not ambient
//! global state, and holds its breakers for the process lifetime with no
//! eviction.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats};

/// Directory of shared circuit breakers keyed by logical name.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the breaker registered under `name`, creating it with `config`
    /// on first use. Subsequent calls for the same name return the same
    /// instance and ignore their `config` argument.
    pub fn get_or_create(
        &self,
        name: &str,
        config: CircuitBreakerConfig,
    ) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        Arc::clone(
            breakers
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config))),
        )
    }

    /// Look up an existing breaker without creating one.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.lock().get(name).cloned()
    }

    /// Snapshot the stats of every registered breaker.
    #[must_use]
    pub fn all_stats(&self) -> Vec<CircuitBreakerStats> {
        self.breakers.lock().values().map(|b| b.stats()).collect()
    }

    /// Incident response: trip every breaker open.
    pub fn force_open_all(&self) {
        for breaker in self.breakers.lock().values() {
            breaker.force_open();
        }
    }

    /// Incident response: close every breaker and reset failure counters.
    pub fn force_close_all(&self) {
        for breaker in self.breakers.lock().values() {
            breaker.force_close();
        }
    }

    /// Number of registered breakers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.lock().len()
    }

    /// Whether no breakers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::circuit_breaker::CircuitState;

    #[test]
    fn test_same_name_shares_instance() {
        let registry = CircuitBreakerRegistry::new();
        let a = registry.get_or_create("model-server", CircuitBreakerConfig::default());
        let b = registry.get_or_create("model-server", CircuitBreakerConfig::default());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_force_open_all() {
        let registry = CircuitBreakerRegistry::new();
        let a = registry.get_or_create("a", CircuitBreakerConfig::default());
        let b = registry.get_or_create("b", CircuitBreakerConfig::default());

        registry.force_open_all();
        assert_eq!(a.state(), CircuitState::Open);
        assert_eq!(b.state(), CircuitState::Open);

        registry.force_close_all();
        assert_eq!(a.state(), CircuitState::Closed);
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn test_get_without_create() {
        let registry = CircuitBreakerRegistry::new();
        assert!(registry.get("missing").is_none());
        assert!(registry.is_empty());
        registry.get_or_create("present", CircuitBreakerConfig::default());
        assert!(registry.get("present").is_some());
        assert_eq!(registry.all_stats().len(), 1);
    }
}
