//! Engine-internal event notifications.
//!
//! Components report structural events (breaker transitions, retry attempts,
//! failover hops) through a callback installed by the orchestrator, which
//! turns them into audit actions. Explicit ownership instead of a global
//! broadcast bus: a component without a hook simply stays silent.

use std::sync::Arc;
use std::time::Duration;

use crate::breaker::CircuitState;

/// Structural event emitted by a component.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A breaker moved between states.
    BreakerTransition {
        key: String,
        from: CircuitState,
        to: CircuitState,
        reason: String,
    },

    /// A call was rejected fast because the circuit is open.
    BreakerRejected { key: String },

    /// A protected call completed successfully.
    BreakerCallSucceeded { key: String },

    /// A protected call failed (transport error or timeout).
    BreakerCallFailed { key: String, error: String },

    /// A retry was scheduled after a retryable failure.
    RetryScheduled {
        operation: String,
        attempt: u32,
        delay: Duration,
        error: String,
    },

    /// All retry attempts for one call were consumed.
    RetryExhausted { operation: String, attempts: u32 },

    /// One failover hop completed (successfully or not).
    FailoverAttempt {
        operation: String,
        provider_id: String,
        attempt: u32,
        success: bool,
        latency: Duration,
        error: Option<String>,
    },

    /// A stale cached value was served because every candidate failed.
    FailoverServedStale { operation: String, cache_key: String },
}

/// Callback invoked synchronously for every [`EngineEvent`].
///
/// Hooks must be cheap and must not block; heavy work belongs behind the
/// audit sink, not in the hook.
pub type EventHook = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

/// Invoke the hook if one is installed.
pub(crate) fn emit(hook: &Option<EventHook>, event: EngineEvent) {
    if let Some(hook) = hook {
        hook(&event);
    }
}
