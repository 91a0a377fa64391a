//! Provider records and the read-only seam to external persistence.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CallError;

/// A single external API provider as declared by the embedding service.
///
/// Runtime health lives in the failover coordinator, not here; this record
/// only carries declared, slow-changing attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    /// Unique provider identifier.
    pub id: String,

    /// Human-readable name for logs and audit records.
    pub name: String,

    /// Endpoint the transport callback should target.
    pub endpoint: String,

    /// Declared priority (higher = preferred) for priority-based failover.
    #[serde(default)]
    pub priority: u32,

    /// Weight reserved for weighted selection (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl Provider {
    pub fn new(id: impl Into<String>, name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            endpoint: endpoint.into(),
            priority: 0,
            weight: 1,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }
}

/// Aggregated historical statistics for one provider, as persisted by the
/// external health-check store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryStats {
    /// Mean observed latency over the queried window, in milliseconds.
    pub average_latency_ms: f64,

    /// Fraction of checks that succeeded, in [0, 1].
    pub uptime: f64,

    /// Number of health-check rows behind these aggregates.
    pub total_checks: u64,
}

/// Narrow read interface onto the persistence layer.
///
/// The engine only ever reads aggregates through this trait; writing
/// health-check rows is the scheduler's business.
#[async_trait]
pub trait ProviderRepository: Send + Sync {
    /// Every provider known to the persistence layer.
    async fn list_all(&self) -> Result<Vec<Provider>, CallError>;

    /// Aggregated stats for `provider_id` over the trailing `since` window.
    async fn history_stats(
        &self,
        provider_id: &str,
        since: Duration,
    ) -> Result<HistoryStats, CallError>;
}
