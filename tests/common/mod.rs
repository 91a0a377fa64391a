//! Shared fixtures for integration tests.

use std::time::Duration;

use async_trait::async_trait;

use resilience_engine::error::CallError;
use resilience_engine::provider::{HistoryStats, Provider, ProviderRepository};
use resilience_engine::EngineConfig;

/// Repository stub with a fixed, well-sampled history for every provider.
pub struct StubRepo {
    pub latency_ms: f64,
    pub uptime: f64,
    pub checks: u64,
}

impl StubRepo {
    pub fn healthy() -> Self {
        Self {
            latency_ms: 100.0,
            uptime: 0.99,
            checks: 500,
        }
    }
}

#[async_trait]
impl ProviderRepository for StubRepo {
    async fn list_all(&self) -> Result<Vec<Provider>, CallError> {
        Ok(two_providers())
    }

    async fn history_stats(
        &self,
        _provider_id: &str,
        _since: Duration,
    ) -> Result<HistoryStats, CallError> {
        Ok(HistoryStats {
            average_latency_ms: self.latency_ms,
            uptime: self.uptime,
            total_checks: self.checks,
        })
    }
}

/// Two providers: "a" preferred by priority, "b" second choice.
pub fn two_providers() -> Vec<Provider> {
    vec![
        Provider::new("a", "Provider A", "https://a.example").with_priority(2),
        Provider::new("b", "Provider B", "https://b.example").with_priority(1),
    ]
}

/// Install the env-filtered test subscriber. No-op after the first call.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config hardened for test speed: tiny delays, no jitter surprises.
pub fn fast_config() -> EngineConfig {
    init_tracing();
    let mut config = EngineConfig::default();
    config.breaker.failure_threshold = 2;
    config.breaker.success_threshold = 1;
    config.breaker.recovery_timeout_ms = 100;
    config.breaker.call_timeout_ms = 1_000;
    config.retry.max_attempts = 2;
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config.retry.jitter_max_ms = 1;
    config.failover.cooldown_ms = 50;
    config
}
