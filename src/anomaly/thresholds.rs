//! Adaptive detection thresholds.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::config::AnomalyConfig;

/// Sane bounds the adaptation may never leave.
pub const LATENCY_MULTIPLIER_BOUNDS: (f64, f64) = (1.5, 3.0);
pub const ERROR_RATE_BOUNDS: (f64, f64) = (0.05, 0.2);

/// Per-provider detection thresholds, nudged each adaptation cycle.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AdaptiveThresholds {
    pub latency_multiplier: f64,
    pub error_rate_threshold: f64,
    pub availability_threshold: f64,
    pub confidence_threshold: f64,
}

impl AdaptiveThresholds {
    pub fn from_config(config: &AnomalyConfig) -> Self {
        Self {
            latency_multiplier: config.latency_multiplier,
            error_rate_threshold: config.error_rate_threshold,
            availability_threshold: config.availability_threshold,
            confidence_threshold: config.confidence_threshold,
        }
    }
}

/// The full per-provider threshold table behind one atomic pointer.
///
/// Adaptation builds a complete replacement table and publishes it with a
/// single `store`; detection reads whatever table is current. There is no
/// intermediate state to observe.
pub struct ThresholdTable {
    inner: ArcSwap<HashMap<String, AdaptiveThresholds>>,
}

impl ThresholdTable {
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Thresholds for `provider_id`, falling back to the configured defaults.
    pub fn get(&self, provider_id: &str, config: &AnomalyConfig) -> AdaptiveThresholds {
        self.inner
            .load()
            .get(provider_id)
            .copied()
            .unwrap_or_else(|| AdaptiveThresholds::from_config(config))
    }

    pub fn snapshot(&self) -> Arc<HashMap<String, AdaptiveThresholds>> {
        self.inner.load_full()
    }

    /// Atomically replace the whole table.
    pub fn publish(&self, table: HashMap<String, AdaptiveThresholds>) {
        self.inner.store(Arc::new(table));
    }

    pub fn reset(&self) {
        self.inner.store(Arc::new(HashMap::new()));
    }
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self::new()
    }
}
