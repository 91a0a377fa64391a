//! Per-key breaker registry.

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::BreakerConfig;
use crate::event::EventHook;

use super::breaker::CircuitBreaker;
use super::state::BreakerSnapshot;

/// Owns one [`CircuitBreaker`] per operation key.
///
/// Passed by reference to the orchestrator rather than living as a global;
/// each breaker is its own mutual-exclusion domain, so contention on one key
/// never blocks calls against another.
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    hook: Option<EventHook>,
}

impl BreakerRegistry {
    pub fn new(hook: Option<EventHook>) -> Self {
        Self {
            breakers: DashMap::new(),
            hook,
        }
    }

    /// Fetch the breaker for `key`, creating it with `config` on first use.
    ///
    /// `config` binds at creation time only: an existing breaker keeps the
    /// thresholds it was created with, so a key's failure window is never
    /// re-interpreted mid-flight. Use [`BreakerRegistry::reset`] to rebuild
    /// breakers under a new config.
    pub fn get_or_create(&self, key: &str, config: &BreakerConfig) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(key, config.clone(), self.hook.clone()))
            })
            .clone()
    }

    /// Snapshot of one breaker, if it exists.
    pub fn status(&self, key: &str) -> Option<BreakerSnapshot> {
        self.breakers.get(key).map(|b| b.snapshot())
    }

    /// Snapshots of every registered breaker.
    pub fn all_statuses(&self) -> Vec<BreakerSnapshot> {
        self.breakers.iter().map(|b| b.snapshot()).collect()
    }

    /// Drop all breakers and their state.
    pub fn reset(&self) {
        self.breakers.clear();
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_breaker_per_key() {
        let registry = BreakerRegistry::new(None);
        let config = BreakerConfig::default();

        let a = registry.get_or_create("p1:fetch", &config);
        let b = registry.get_or_create("p1:fetch", &config);
        let c = registry.get_or_create("p2:fetch", &config);

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_config_binds_at_creation() {
        let registry = BreakerRegistry::new(None);
        let mut strict = BreakerConfig::default();
        strict.failure_threshold = 1;
        let breaker = registry.get_or_create("p1:fetch", &strict);

        // A later lookup with different thresholds returns the same breaker,
        // still operating under the config it was created with.
        let mut loose = BreakerConfig::default();
        loose.failure_threshold = 100;
        let same = registry.get_or_create("p1:fetch", &loose);
        assert!(Arc::ptr_eq(&breaker, &same));

        let _ = same
            .execute(|| async { Err::<(), _>(crate::error::CallError::Status(503)) })
            .await;
        assert_eq!(same.snapshot().state, crate::breaker::CircuitState::Open);
    }

    #[test]
    fn test_reset_clears_state() {
        let registry = BreakerRegistry::new(None);
        registry.get_or_create("p1:fetch", &BreakerConfig::default());
        registry.reset();
        assert!(registry.is_empty());
        assert!(registry.status("p1:fetch").is_none());
    }
}
