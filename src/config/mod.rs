//! Configuration subsystem.
//!
//! # Data Flow
//! ```text
//! TOML file → loader.rs (parse)
//!     → validation.rs (semantic checks, all errors reported)
//!     → schema.rs structs consumed by the engine
//! ```
//!
//! # Design Decisions
//! - Every section has production defaults; an empty file is a valid config
//! - Serde handles syntax, validation.rs handles semantics
//! - Feature gates (breaker/retry/failover/anomaly) live in the config, so
//!   the orchestrator pipeline is data-driven

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AnomalyConfig, BreakerConfig, EngineConfig, FailoverConfig, FailoverStrategy, RetryConfig,
};
