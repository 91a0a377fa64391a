//! Self-healing resilience engine for outbound provider calls.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌────────────────────────────────────────────────────┐
//!                 │             SelfHealingOrchestrator                │
//!   caller        │                                                    │
//!   ─────────────▶│  anomaly pass (informational)                      │
//!                 │        │                                           │
//!                 │        ▼                                           │
//!                 │  per provider: retry( breaker( transport call ) )  │
//!                 │        │ exhausted                                 │
//!                 │        ▼                                           │
//!                 │  failover coordinator (health, strategy, cache)    │
//!                 │        │ exhausted                                 │
//!                 │        ▼                                           │
//!                 │  last resort: each provider once                   │
//!                 └────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//!                 audit sink (actions, anomalies, breaker snapshots)
//! ```
//!
//! The transport is an opaque caller-supplied async callback; persistence is
//! reached through [`provider::ProviderRepository`]; audit records flow into
//! an [`audit::AuditSink`]. The engine itself holds only in-memory state and
//! is safe to share across concurrent calls.

// Core decision components
pub mod breaker;
pub mod failover;
pub mod retry;

// Detection
pub mod anomaly;

// Composition and cross-cutting concerns
pub mod audit;
pub mod config;
pub mod error;
pub mod event;
pub mod orchestrator;
pub mod provider;

pub use anomaly::{AnomalyDetector, AnomalyKind, AnomalyResult, Severity};
pub use audit::{AuditSink, InMemoryAuditSink, SelfHealingAction};
pub use breaker::{BreakerRegistry, CircuitBreaker, CircuitState};
pub use config::EngineConfig;
pub use error::{CallError, ResilienceError};
pub use failover::{FailoverCoordinator, ProviderHealth};
pub use orchestrator::{SelfHealingOrchestrator, SelfHealingResult, SelfHealingStats};
pub use provider::{Provider, ProviderRepository};
pub use retry::RetryExecutor;

/// Unix milliseconds for serialized timestamps.
pub(crate) fn unix_ms(t: std::time::SystemTime) -> u64 {
    t.duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
