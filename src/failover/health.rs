//! Per-provider health bookkeeping.

use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime};

use dashmap::DashMap;
use serde::Serialize;

use crate::unix_ms;

/// Observed health of one provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub provider_id: String,
    /// False after any failure, true again after the next success.
    pub healthy: bool,
    /// Smoothed observed latency of recent successful calls.
    pub latency_ms: u64,
    /// Lifetime failure fraction, in [0, 1].
    pub error_rate: f64,
    pub consecutive_failures: u32,
    pub last_failure_ms: Option<u64>,
    /// Bounded reliability estimate in [0, 1].
    pub health_score: f64,
    pub total_successes: u64,
    pub total_failures: u64,
}

impl ProviderHealth {
    fn new(provider_id: &str) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            healthy: true,
            latency_ms: 0,
            error_rate: 0.0,
            consecutive_failures: 0,
            last_failure_ms: None,
            health_score: 1.0,
            total_successes: 0,
            total_failures: 0,
        }
    }

    fn refresh_error_rate(&mut self) {
        let total = self.total_successes + self.total_failures;
        if total > 0 {
            self.error_rate = self.total_failures as f64 / total as f64;
        }
    }
}

/// Shared health and cooldown maps for all failover invocations.
///
/// Updates go through the DashMap entry API, so concurrent read-modify-write
/// against the same provider is serialized per key and never loses a score
/// decay.
pub struct HealthTracker {
    health: DashMap<String, ProviderHealth>,
    cooldowns: DashMap<String, Instant>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            health: DashMap::new(),
            cooldowns: DashMap::new(),
        }
    }

    pub fn record_success(&self, provider_id: &str, latency: Duration) {
        let mut entry = self
            .health
            .entry(provider_id.to_string())
            .or_insert_with(|| ProviderHealth::new(provider_id));
        entry.healthy = true;
        entry.consecutive_failures = 0;
        entry.total_successes += 1;
        entry.health_score = (entry.health_score + 0.1).min(1.0);
        let observed = latency.as_millis() as u64;
        entry.latency_ms = if entry.latency_ms == 0 {
            observed
        } else {
            // Light smoothing so one fast call doesn't mask a slow provider.
            (entry.latency_ms * 3 + observed) / 4
        };
        entry.refresh_error_rate();
        drop(entry);

        self.cooldowns.remove(provider_id);
    }

    pub fn record_failure(&self, provider_id: &str) {
        let mut entry = self
            .health
            .entry(provider_id.to_string())
            .or_insert_with(|| ProviderHealth::new(provider_id));
        entry.healthy = false;
        entry.consecutive_failures += 1;
        entry.total_failures += 1;
        entry.health_score = (entry.health_score - 0.2).max(0.0);
        entry.last_failure_ms = Some(unix_ms(SystemTime::now()));
        entry.refresh_error_rate();
        drop(entry);

        self.cooldowns.insert(provider_id.to_string(), Instant::now());
    }

    /// Whether `provider_id` is inside its post-failure cooldown window.
    pub fn in_cooldown(&self, provider_id: &str, window: Duration) -> bool {
        match self.cooldowns.get(provider_id) {
            Some(since) => since.elapsed() < window,
            None => false,
        }
    }

    pub fn get(&self, provider_id: &str) -> Option<ProviderHealth> {
        self.health.get(provider_id).map(|h| h.clone())
    }

    /// Health for selection purposes; unknown providers start with a clean
    /// record rather than being filtered out.
    pub fn get_or_default(&self, provider_id: &str) -> ProviderHealth {
        self.get(provider_id)
            .unwrap_or_else(|| ProviderHealth::new(provider_id))
    }

    pub fn all(&self) -> HashMap<String, ProviderHealth> {
        self.health
            .iter()
            .map(|h| (h.key().clone(), h.value().clone()))
            .collect()
    }

    pub fn reset(&self) {
        self.health.clear();
        self.cooldowns.clear();
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_decay_and_recovery() {
        let tracker = HealthTracker::new();

        tracker.record_failure("p1");
        tracker.record_failure("p1");
        let health = tracker.get("p1").unwrap();
        assert!((health.health_score - 0.6).abs() < 1e-9);
        assert!(!health.healthy);
        assert_eq!(health.consecutive_failures, 2);

        tracker.record_success("p1", Duration::from_millis(50));
        let health = tracker.get("p1").unwrap();
        assert!((health.health_score - 0.7).abs() < 1e-9);
        assert!(health.healthy);
        assert_eq!(health.consecutive_failures, 0);
    }

    #[test]
    fn test_score_clamped() {
        let tracker = HealthTracker::new();
        for _ in 0..10 {
            tracker.record_failure("p1");
        }
        assert_eq!(tracker.get("p1").unwrap().health_score, 0.0);

        for _ in 0..20 {
            tracker.record_success("p1", Duration::from_millis(10));
        }
        assert_eq!(tracker.get("p1").unwrap().health_score, 1.0);
    }

    #[test]
    fn test_cooldown_cleared_on_success() {
        let tracker = HealthTracker::new();
        let window = Duration::from_secs(60);

        tracker.record_failure("p1");
        assert!(tracker.in_cooldown("p1", window));

        tracker.record_success("p1", Duration::from_millis(10));
        assert!(!tracker.in_cooldown("p1", window));
    }
}
