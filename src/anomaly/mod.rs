//! Anomaly detection subsystem.
//!
//! # Data Flow
//! ```text
//! detect_anomalies(observations):
//!     per provider:
//!         → baseline.rs (refresh from the persisted history interface)
//!         → three checks: latency ratio, error-rate increase, availability drop
//!     batch end:
//!         → append observations to the bounded learning history
//!         → thresholds.rs (adapt toward variance-derived targets, one swap)
//! ```
//!
//! # Design Decisions
//! - A provider with fewer than `min_samples` persisted checks is skipped
//! - One provider's detection failure is logged, never aborts the batch
//! - Threshold adaptation publishes a whole new table atomically; readers
//!   see pre- or post-adaptation values, never a torn mix

pub mod baseline;
pub mod detector;
pub mod thresholds;

pub use baseline::ProviderBaseline;
pub use detector::{
    AnomalyDetector, AnomalyKind, AnomalyResult, MetricsSnapshot, ProviderObservation, Severity,
};
pub use thresholds::AdaptiveThresholds;
