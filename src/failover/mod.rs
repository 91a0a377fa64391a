//! Failover subsystem.
//!
//! # Data Flow
//! ```text
//! execute_with_failover:
//!     → cache.rs (fresh hit short-circuits, no provider invoked)
//!     → health.rs (filter by score / latency / cooldown)
//!     → strategy.rs (order the surviving candidates)
//!     → try candidates in order, bounded by max_failover_attempts
//!     → on total failure: cache.rs again (stale read, explicit degradation)
//! ```
//!
//! # Design Decisions
//! - Health scores decay −0.2 on failure, recover +0.1 on success, clamped
//! - A failed provider sits out a cooldown window before re-selection
//! - Stale cache reads are a last resort and are flagged as such, never
//!   silent success

pub mod cache;
pub mod coordinator;
pub mod health;
pub mod strategy;

pub use cache::ResultCache;
pub use coordinator::{FailoverAttempt, FailoverCoordinator, FailoverOutcome};
pub use health::{HealthTracker, ProviderHealth};
pub use strategy::{order_candidates, Candidate};
