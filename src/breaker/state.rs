//! Breaker state types and introspection snapshots.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Instant, SystemTime};

use serde::{Deserialize, Serialize};

use crate::unix_ms;

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Lifetime counters for one breaker.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BreakerTotals {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    /// Calls rejected without invoking the operation (Open state).
    pub rejections: u64,
}

/// Mutable record behind the breaker's mutex.
///
/// `failures` holds the instants of failures inside the monitoring period;
/// it is pruned on every mutation so the window slides rather than resets.
#[derive(Debug)]
pub(crate) struct BreakerRecord {
    pub state: CircuitState,
    pub failures: VecDeque<Instant>,
    pub half_open_successes: u32,
    pub last_failure: Option<SystemTime>,
    pub last_success: Option<SystemTime>,
    pub state_changed: SystemTime,
    /// Set iff state is Open.
    pub next_attempt: Option<Instant>,
    pub totals: BreakerTotals,
}

impl BreakerRecord {
    pub fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            half_open_successes: 0,
            last_failure: None,
            last_success: None,
            state_changed: SystemTime::now(),
            next_attempt: None,
            totals: BreakerTotals::default(),
        }
    }
}

/// Read-only view of a breaker, safe to hand to metrics consumers and the
/// audit sink. Timestamps are unix milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub key: String,
    pub state: CircuitState,
    /// Failures currently inside the monitoring window.
    pub failure_count: u32,
    /// Consecutive successes observed while half-open.
    pub half_open_successes: u32,
    pub last_failure_ms: Option<u64>,
    pub last_success_ms: Option<u64>,
    pub state_changed_ms: u64,
    /// Milliseconds until the next probe is admitted, when Open.
    pub next_attempt_in_ms: Option<u64>,
    pub totals: BreakerTotals,
}

impl BreakerSnapshot {
    pub(crate) fn from_record(key: &str, record: &BreakerRecord) -> Self {
        let now = Instant::now();
        Self {
            key: key.to_string(),
            state: record.state,
            failure_count: record.failures.len() as u32,
            half_open_successes: record.half_open_successes,
            last_failure_ms: record.last_failure.map(unix_ms),
            last_success_ms: record.last_success.map(unix_ms),
            state_changed_ms: unix_ms(record.state_changed),
            next_attempt_in_ms: record
                .next_attempt
                .map(|at| at.saturating_duration_since(now).as_millis() as u64),
            totals: record.totals,
        }
    }
}
