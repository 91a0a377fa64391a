//! Historical baselines per provider.

use std::time::SystemTime;

use serde::Serialize;

use crate::provider::HistoryStats;
use crate::unix_ms;

/// A provider's historically typical behavior, rebuilt each detection cycle
/// from the persisted health-check aggregates.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderBaseline {
    pub provider_id: String,
    pub average_latency_ms: f64,
    /// Historical failure fraction, derived from uptime.
    pub error_rate: f64,
    /// Fraction of checks where the provider was reachable, in [0, 1].
    pub availability: f64,
    /// Number of persisted checks behind these aggregates.
    pub sample_size: u64,
    pub last_updated_ms: u64,
}

impl ProviderBaseline {
    pub fn from_stats(provider_id: &str, stats: &HistoryStats) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            average_latency_ms: stats.average_latency_ms,
            error_rate: (1.0 - stats.uptime).clamp(0.0, 1.0),
            availability: stats.uptime.clamp(0.0, 1.0),
            sample_size: stats.total_checks,
            last_updated_ms: unix_ms(SystemTime::now()),
        }
    }
}
