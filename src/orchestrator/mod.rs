//! Orchestration subsystem.
//!
//! # Data Flow
//! ```text
//! execute_with_self_healing:
//!     → anomaly pass (informational, never blocks execution)
//!     → per provider, in order: retry(breaker(transport call)), early exit
//!     → failover coordinator over the same provider list
//!     → last resort: each provider once, uncoordinated
//!     → structured result (success or fully-populated failure, never a panic
//!       or an error the caller must catch)
//! ```
//!
//! # Design Decisions
//! - Sequential with early exit, not concurrent fan-out
//! - Every structural action lands in the audit sink with a severity
//! - Audit failures are the sink's problem; the call path never notices

pub mod engine;

pub use engine::{SelfHealingOrchestrator, SelfHealingResult, SelfHealingStats};
