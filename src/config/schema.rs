//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine.
//! All types derive Serde traits for deserialization from config files, and
//! all defaults are production values.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the self-healing engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Circuit breaker settings (per operation key).
    pub breaker: BreakerConfig,

    /// Retry and backoff settings.
    pub retry: RetryConfig,

    /// Failover selection and caching settings.
    pub failover: FailoverConfig,

    /// Anomaly detection settings.
    pub anomaly: AnomalyConfig,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Enable circuit breaking in the orchestrator pipeline.
    pub enabled: bool,

    /// Failures within the monitoring period before the circuit opens.
    pub failure_threshold: u32,

    /// Consecutive half-open successes required to close the circuit.
    pub success_threshold: u32,

    /// How long an open circuit rejects calls before allowing a probe.
    pub recovery_timeout_ms: u64,

    /// Sliding window within which failures are counted.
    pub monitoring_period_ms: u64,

    /// Hard deadline for each protected call.
    pub call_timeout_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout_ms: 30_000,
            monitoring_period_ms: 60_000,
            call_timeout_ms: 10_000,
        }
    }
}

impl BreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    pub fn monitoring_period(&self) -> Duration {
        Duration::from_millis(self.monitoring_period_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries in the orchestrator pipeline.
    pub enabled: bool,

    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Cap on the exponential delay in milliseconds.
    pub max_delay_ms: u64,

    /// Multiplier applied per attempt (2.0 = doubling).
    pub backoff_multiplier: f64,

    /// Upper bound of the uniform jitter added to each delay.
    pub jitter_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
            jitter_max_ms: 100,
        }
    }
}

/// Failover candidate ordering strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverStrategy {
    /// Descending declared priority.
    PriorityBased,
    /// Ascending observed latency.
    LeastLatency,
    /// Descending health score.
    HealthWeighted,
    /// Rotating start offset over the candidate list.
    RoundRobin,
}

/// Failover configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Enable the failover stage in the orchestrator pipeline.
    pub enabled: bool,

    /// Candidate ordering strategy.
    pub strategy: FailoverStrategy,

    /// Maximum providers tried in one failover pass.
    pub max_failover_attempts: u32,

    /// Minimum health score for a provider to be eligible.
    pub health_threshold: f64,

    /// Maximum observed latency for a provider to be eligible.
    pub latency_threshold_ms: u64,

    /// How long a provider is skipped after a failure.
    pub cooldown_ms: u64,

    /// Enable the short-lived result cache.
    pub cache_enabled: bool,

    /// Freshness window for cached results.
    pub cache_ttl_ms: u64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: FailoverStrategy::PriorityBased,
            max_failover_attempts: 3,
            health_threshold: 0.3,
            latency_threshold_ms: 10_000,
            cooldown_ms: 30_000,
            cache_enabled: true,
            cache_ttl_ms: 60_000,
        }
    }
}

impl FailoverConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

/// Anomaly detection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Enable the detection pass in the orchestrator pipeline.
    pub enabled: bool,

    /// Minimum persisted sample size before detection applies to a provider.
    pub min_samples: u64,

    /// Initial latency ratio above which a spike is flagged.
    pub latency_multiplier: f64,

    /// Initial error-rate ceiling.
    pub error_rate_threshold: f64,

    /// Availability floor.
    pub availability_threshold: f64,

    /// Minimum confidence for an anomaly to be emitted.
    pub confidence_threshold: f64,

    /// Fraction of the distance to the adaptation target applied per cycle.
    pub adaptation_rate: f64,

    /// Baseline lookback and learning-history retention window.
    pub history_window_ms: u64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_samples: 50,
            latency_multiplier: 2.0,
            error_rate_threshold: 0.1,
            availability_threshold: 0.9,
            confidence_threshold: 0.7,
            adaptation_rate: 0.1,
            history_window_ms: 7 * 24 * 60 * 60 * 1000,
        }
    }
}

impl AnomalyConfig {
    pub fn history_window(&self) -> Duration {
        Duration::from_millis(self.history_window_ms)
    }
}
