//! Configuration validation.
//!
//! Serde handles syntax; this module checks semantics. Validation is a pure
//! function over the config and reports all violations, not just the first.

use std::fmt;

use crate::config::schema::EngineConfig;

/// A single semantic violation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn err(errors: &mut Vec<ValidationError>, field: &str, message: impl Into<String>) {
    errors.push(ValidationError {
        field: field.to_string(),
        message: message.into(),
    });
}

/// Validate an [`EngineConfig`], returning every violation found.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let b = &config.breaker;
    if b.failure_threshold == 0 {
        err(&mut errors, "breaker.failure_threshold", "must be at least 1");
    }
    if b.success_threshold == 0 {
        err(&mut errors, "breaker.success_threshold", "must be at least 1");
    }
    if b.monitoring_period_ms == 0 {
        err(&mut errors, "breaker.monitoring_period_ms", "must be positive");
    }
    if b.call_timeout_ms == 0 {
        err(&mut errors, "breaker.call_timeout_ms", "must be positive");
    }

    let r = &config.retry;
    if r.max_attempts == 0 {
        err(&mut errors, "retry.max_attempts", "must be at least 1");
    }
    if r.backoff_multiplier < 1.0 {
        err(&mut errors, "retry.backoff_multiplier", "must be >= 1.0");
    }
    if r.max_delay_ms < r.base_delay_ms {
        err(&mut errors, "retry.max_delay_ms", "must be >= base_delay_ms");
    }

    let f = &config.failover;
    if f.max_failover_attempts == 0 {
        err(&mut errors, "failover.max_failover_attempts", "must be at least 1");
    }
    if !(0.0..=1.0).contains(&f.health_threshold) {
        err(&mut errors, "failover.health_threshold", "must be in [0, 1]");
    }
    if f.cache_enabled && f.cache_ttl_ms == 0 {
        err(&mut errors, "failover.cache_ttl_ms", "must be positive when caching is enabled");
    }

    let a = &config.anomaly;
    if a.latency_multiplier < 1.0 {
        err(&mut errors, "anomaly.latency_multiplier", "must be >= 1.0");
    }
    if !(0.0..=1.0).contains(&a.error_rate_threshold) {
        err(&mut errors, "anomaly.error_rate_threshold", "must be in [0, 1]");
    }
    if !(0.0..=1.0).contains(&a.availability_threshold) {
        err(&mut errors, "anomaly.availability_threshold", "must be in [0, 1]");
    }
    if !(0.0..=1.0).contains(&a.confidence_threshold) {
        err(&mut errors, "anomaly.confidence_threshold", "must be in [0, 1]");
    }
    if !(0.0..=1.0).contains(&a.adaptation_rate) {
        err(&mut errors, "anomaly.adaptation_rate", "must be in [0, 1]");
    }
    if a.history_window_ms == 0 {
        err(&mut errors, "anomaly.history_window_ms", "must be positive");
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
