//! Circuit breaking subsystem.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: provider assumed down, calls fail fast
//! - HalfOpen: testing if the provider recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure count >= threshold within monitoring period
//! Open → HalfOpen: first call at/after next_attempt (lazy, no timer task)
//! HalfOpen → Closed: success_threshold consecutive successes
//! HalfOpen → Open: any single failure
//! ```
//!
//! # Design Decisions
//! - One breaker per operation key (provider + operation), never global
//! - Fail fast in Open: the wrapped operation is not invoked
//! - Sliding failure window (pruned instants), not a bare counter
//! - The protected call is raced against a hard timeout; the caller is
//!   unblocked at the deadline even if the call is still in flight

pub mod breaker;
pub mod registry;
pub mod state;

pub use breaker::CircuitBreaker;
pub use registry::BreakerRegistry;
pub use state::{BreakerSnapshot, BreakerTotals, CircuitState};
