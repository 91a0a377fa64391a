//! Audit records and the external sink seam.
//!
//! # Responsibilities
//! - Define the `SelfHealingAction` record emitted for every structural
//!   action the engine takes
//! - Define the `AuditSink` trait the orchestrator writes through
//!
//! # Design Decisions
//! - Sinks are fire-and-forget: a failing sink is the sink's problem, the
//!   protected call must never notice
//! - Query methods default to empty so write-only sinks stay trivial
//! - The engine never reads its own actions back on the hot path

pub mod memory;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;
use uuid::Uuid;

use crate::anomaly::detector::Severity;
use crate::anomaly::AnomalyResult;
use crate::breaker::BreakerSnapshot;
use crate::unix_ms;

pub use memory::{InMemoryAuditSink, RecordedAnomaly};

/// What kind of structural action was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    BreakerTransition,
    BreakerRejection,
    BreakerCallSucceeded,
    BreakerCallFailed,
    RetryScheduled,
    RetryExhausted,
    FailoverAttempt,
    StaleCacheServed,
    AnomalyDetected,
    LastResortAttempt,
    TerminalFailure,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionType::BreakerTransition => "breaker_transition",
            ActionType::BreakerRejection => "breaker_rejection",
            ActionType::BreakerCallSucceeded => "breaker_call_succeeded",
            ActionType::BreakerCallFailed => "breaker_call_failed",
            ActionType::RetryScheduled => "retry_scheduled",
            ActionType::RetryExhausted => "retry_exhausted",
            ActionType::FailoverAttempt => "failover_attempt",
            ActionType::StaleCacheServed => "stale_cache_served",
            ActionType::AnomalyDetected => "anomaly_detected",
            ActionType::LastResortAttempt => "last_resort_attempt",
            ActionType::TerminalFailure => "terminal_failure",
        };
        write!(f, "{}", name)
    }
}

/// Audit record for one self-healing action.
///
/// Emitted to the external sink; the engine never reads these back except
/// through the stats aggregation path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfHealingAction {
    pub id: Uuid,
    pub action_type: ActionType,
    pub provider_id: Option<String>,
    pub operation: Option<String>,
    /// Breaker state before a transition, when applicable.
    pub previous_state: Option<String>,
    pub new_state: Option<String>,
    pub reason: String,
    pub metadata: Option<serde_json::Value>,
    pub severity: Severity,
    pub resolved: bool,
    pub resolved_at_ms: Option<u64>,
    pub at_ms: u64,
}

impl SelfHealingAction {
    pub fn new(action_type: ActionType, reason: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_type,
            provider_id: None,
            operation: None,
            previous_state: None,
            new_state: None,
            reason: reason.into(),
            metadata: None,
            severity,
            resolved: false,
            resolved_at_ms: None,
            at_ms: unix_ms(SystemTime::now()),
        }
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_states(
        mut self,
        previous: impl Into<String>,
        new: impl Into<String>,
    ) -> Self {
        self.previous_state = Some(previous.into());
        self.new_state = Some(new.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Destination for audit records.
///
/// Implementations must not block and must swallow their own failures;
/// observability never compromises availability.
pub trait AuditSink: Send + Sync {
    fn record_action(&self, action: SelfHealingAction);

    fn record_anomaly(&self, _anomaly: &AnomalyResult) {}

    fn record_breaker_snapshot(&self, _snapshot: &BreakerSnapshot) {}

    /// Mark open records for a provider resolved after it recovered.
    fn resolve_for_provider(&self, _provider_id: &str) {}

    /// Actions recorded at/after `since_ms` (unix milliseconds).
    fn actions_since(&self, _since_ms: u64) -> Vec<SelfHealingAction> {
        Vec::new()
    }

    /// Anomalies recorded at/after `since_ms` (unix milliseconds).
    fn anomalies_since(&self, _since_ms: u64) -> Vec<RecordedAnomaly> {
        Vec::new()
    }
}
