//! Retry subsystem.
//!
//! # Responsibilities
//! - Classify errors as retryable before consuming an attempt
//! - Execute retries with exponential backoff + jitter
//! - Retain per-operation aggregate stats for reporting
//!
//! # Design Decisions
//! - Non-retryable errors propagate after the first observation
//! - Jittered backoff prevents thundering herd
//! - An open circuit is not retryable; the caller moves to the next provider

pub mod backoff;
pub mod executor;

pub use backoff::calculate_backoff;
pub use executor::{RetryClassifier, RetryExecutor, RetryStats};
