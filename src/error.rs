//! Error taxonomy for the resilience engine.
//!
//! Two layers:
//! - [`CallError`]: what a transport callback reports about a single provider
//!   call. Carries the retryability classification.
//! - [`ResilienceError`]: what the engine's own components report to their
//!   caller (the orchestrator). Expected degraded paths (open circuit,
//!   exhausted retries) are ordinary variants, not panics.

use std::time::Duration;
use thiserror::Error;

/// Error reported by a transport callback for one provider call.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    /// Connection-level failure (refused, reset, DNS, TLS).
    #[error("network error: {0}")]
    Network(String),

    /// The transport's own deadline fired before a response arrived.
    #[error("transport timeout after {0:?}")]
    Timeout(Duration),

    /// The provider answered with a non-success HTTP status.
    #[error("provider returned status {0}")]
    Status(u16),

    /// Anything else the callback wants to surface.
    #[error("{0}")]
    Other(String),
}

impl CallError {
    /// Whether a retry against the same provider could plausibly succeed.
    ///
    /// Network errors and timeouts are transient by assumption, 5xx means
    /// the provider is unhealthy but reachable and may recover. 4xx means
    /// the request itself is wrong; burning attempts on it is pointless.
    ///
    /// Note the asymmetry: a 4xx still counts as a *reachable* provider for
    /// health-check purposes (the provider answered), it is only excluded
    /// from retries. Flagged for product sign-off rather than resolved here.
    pub fn is_retryable(&self) -> bool {
        match self {
            CallError::Network(_) | CallError::Timeout(_) => true,
            CallError::Status(code) => *code >= 500,
            CallError::Other(_) => false,
        }
    }
}

/// Errors produced by the engine's components.
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// The circuit for this operation key is open; the call was not made.
    #[error("circuit open for '{key}', retry after {retry_after:?}")]
    CircuitOpen { key: String, retry_after: Duration },

    /// The protected call exceeded the breaker's per-call budget.
    #[error("operation '{key}' timed out after {limit:?}")]
    Timeout { key: String, limit: Duration },

    /// All retry attempts were consumed; carries the last underlying error.
    #[error("retries exhausted for '{operation}' after {attempts} attempts")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        last: Box<ResilienceError>,
    },

    /// Failover found no candidate passing the health/latency/cooldown filter.
    #[error("no healthy provider available for '{operation}'")]
    NoHealthyProvider { operation: String },

    /// Every eligible failover candidate was tried and failed.
    #[error("all {attempts} providers failed for '{operation}'")]
    AllProvidersFailed { operation: String, attempts: u32 },

    /// Terminal orchestrator state: every enabled strategy came up empty.
    #[error("all self-healing strategies failed for '{operation}'")]
    AllStrategiesFailed { operation: String },

    /// A transport error propagated unchanged.
    #[error(transparent)]
    Call(#[from] CallError),
}

impl ResilienceError {
    /// Default retry classification used by the retry executor.
    ///
    /// An open circuit is not retryable: backing off for less than the
    /// breaker's recovery timeout cannot change the outcome, the caller
    /// should move to the next provider instead.
    pub fn is_retryable(&self) -> bool {
        match self {
            ResilienceError::Timeout { .. } => true,
            ResilienceError::Call(e) => e.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_error_classification() {
        assert!(CallError::Network("refused".into()).is_retryable());
        assert!(CallError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(CallError::Status(503).is_retryable());
        assert!(!CallError::Status(404).is_retryable());
        assert!(!CallError::Other("bad payload".into()).is_retryable());
    }

    #[test]
    fn test_circuit_open_not_retryable() {
        let err = ResilienceError::CircuitOpen {
            key: "p1:fetch".into(),
            retry_after: Duration::from_secs(30),
        };
        assert!(!err.is_retryable());

        let err = ResilienceError::Timeout {
            key: "p1:fetch".into(),
            limit: Duration::from_secs(5),
        };
        assert!(err.is_retryable());
    }
}
