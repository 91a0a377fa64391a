//! Candidate ordering strategies.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::FailoverStrategy;
use crate::provider::Provider;

use super::health::ProviderHealth;

/// A provider paired with its observed health, after filtering.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub provider: Provider,
    pub health: ProviderHealth,
}

/// Order candidates for a failover pass.
///
/// `rr_index` is the shared rotating offset for round-robin; sorting
/// strategies leave it untouched. All sorts are stable, so equal candidates
/// keep their declared order.
pub fn order_candidates(
    strategy: FailoverStrategy,
    mut candidates: Vec<Candidate>,
    rr_index: &AtomicUsize,
) -> Vec<Candidate> {
    match strategy {
        FailoverStrategy::PriorityBased => {
            candidates.sort_by(|a, b| b.provider.priority.cmp(&a.provider.priority));
            candidates
        }
        FailoverStrategy::LeastLatency => {
            candidates.sort_by(|a, b| a.health.latency_ms.cmp(&b.health.latency_ms));
            candidates
        }
        FailoverStrategy::HealthWeighted => {
            candidates.sort_by(|a, b| {
                b.health
                    .health_score
                    .partial_cmp(&a.health.health_score)
                    .unwrap_or(CmpOrdering::Equal)
            });
            candidates
        }
        FailoverStrategy::RoundRobin => {
            if candidates.is_empty() {
                return candidates;
            }
            let offset = rr_index.fetch_add(1, Ordering::Relaxed) % candidates.len();
            candidates.rotate_left(offset);
            candidates
        }
    }
}
