//! In-memory audit store.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::SystemTime;

use serde::Serialize;

use crate::anomaly::AnomalyResult;
use crate::breaker::BreakerSnapshot;
use crate::unix_ms;

use super::{AuditSink, SelfHealingAction};

/// An anomaly as retained by the store, with its resolution status.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedAnomaly {
    pub anomaly: AnomalyResult,
    pub resolved: bool,
    pub resolved_at_ms: Option<u64>,
}

/// Bounded in-memory [`AuditSink`].
///
/// Serves as the default backing store for stats aggregation and as the
/// test double. Oldest records are evicted once capacity is reached.
pub struct InMemoryAuditSink {
    actions: Mutex<VecDeque<SelfHealingAction>>,
    anomalies: Mutex<VecDeque<RecordedAnomaly>>,
    capacity: usize,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            actions: Mutex::new(VecDeque::new()),
            anomalies: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    pub fn action_count(&self) -> usize {
        self.lock_actions().len()
    }

    pub fn clear(&self) {
        self.lock_actions().clear();
        self.lock_anomalies().clear();
    }

    fn lock_actions(&self) -> std::sync::MutexGuard<'_, VecDeque<SelfHealingAction>> {
        self.actions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_anomalies(&self) -> std::sync::MutexGuard<'_, VecDeque<RecordedAnomaly>> {
        self.anomalies.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for InMemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record_action(&self, action: SelfHealingAction) {
        let mut actions = self.lock_actions();
        if actions.len() >= self.capacity {
            actions.pop_front();
        }
        actions.push_back(action);
    }

    fn record_anomaly(&self, anomaly: &AnomalyResult) {
        let mut anomalies = self.lock_anomalies();
        if anomalies.len() >= self.capacity {
            anomalies.pop_front();
        }
        anomalies.push_back(RecordedAnomaly {
            anomaly: anomaly.clone(),
            resolved: false,
            resolved_at_ms: None,
        });
    }

    fn record_breaker_snapshot(&self, snapshot: &BreakerSnapshot) {
        tracing::debug!(
            key = %snapshot.key,
            state = %snapshot.state,
            failures = snapshot.failure_count,
            "Breaker snapshot recorded"
        );
    }

    fn resolve_for_provider(&self, provider_id: &str) {
        let now_ms = unix_ms(SystemTime::now());

        for action in self.lock_actions().iter_mut() {
            if !action.resolved && action.provider_id.as_deref() == Some(provider_id) {
                action.resolved = true;
                action.resolved_at_ms = Some(now_ms);
            }
        }
        for recorded in self.lock_anomalies().iter_mut() {
            if !recorded.resolved && recorded.anomaly.provider_id == provider_id {
                recorded.resolved = true;
                recorded.resolved_at_ms = Some(now_ms);
            }
        }
    }

    fn actions_since(&self, since_ms: u64) -> Vec<SelfHealingAction> {
        self.lock_actions()
            .iter()
            .filter(|a| a.at_ms >= since_ms)
            .cloned()
            .collect()
    }

    fn anomalies_since(&self, since_ms: u64) -> Vec<RecordedAnomaly> {
        self.lock_anomalies()
            .iter()
            .filter(|r| r.anomaly.detected_at_ms >= since_ms)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::detector::Severity;
    use crate::audit::ActionType;

    fn action(provider: &str) -> SelfHealingAction {
        SelfHealingAction::new(ActionType::FailoverAttempt, "test", Severity::Medium)
            .with_provider(provider)
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let sink = InMemoryAuditSink::with_capacity(2);
        sink.record_action(action("a"));
        sink.record_action(action("b"));
        sink.record_action(action("c"));

        let actions = sink.actions_since(0);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].provider_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_resolution_marks_matching_provider() {
        let sink = InMemoryAuditSink::new();
        sink.record_action(action("a"));
        sink.record_action(action("b"));

        sink.resolve_for_provider("a");

        let actions = sink.actions_since(0);
        let a = actions.iter().find(|x| x.provider_id.as_deref() == Some("a")).unwrap();
        let b = actions.iter().find(|x| x.provider_id.as_deref() == Some("b")).unwrap();
        assert!(a.resolved);
        assert!(a.resolved_at_ms.is_some());
        assert!(!b.resolved);
    }
}
