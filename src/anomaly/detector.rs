//! Baseline-relative anomaly detection with adaptive thresholds.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::AnomalyConfig;
use crate::error::CallError;
use crate::provider::ProviderRepository;
use crate::unix_ms;

use super::baseline::ProviderBaseline;
use super::thresholds::{
    AdaptiveThresholds, ThresholdTable, ERROR_RATE_BOUNDS, LATENCY_MULTIPLIER_BOUNDS,
};

/// What kind of deviation was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    LatencySpike,
    ErrorRateIncrease,
    AvailabilityDrop,
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyKind::LatencySpike => write!(f, "latency_spike"),
            AnomalyKind::ErrorRateIncrease => write!(f, "error_rate_increase"),
            AnomalyKind::AvailabilityDrop => write!(f, "availability_drop"),
        }
    }
}

/// Severity scale shared by anomalies and audit actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Point-in-time metrics for one provider, in baseline units.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricsSnapshot {
    pub latency_ms: f64,
    pub error_rate: f64,
    pub availability: f64,
}

/// What the orchestrator observed about a provider right now.
#[derive(Debug, Clone)]
pub struct ProviderObservation {
    pub provider_id: String,
    pub latency_ms: f64,
    pub error_rate: f64,
    pub healthy: bool,
}

impl ProviderObservation {
    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            latency_ms: self.latency_ms,
            error_rate: self.error_rate,
            availability: if self.healthy { 1.0 } else { 0.0 },
        }
    }
}

/// A flagged deviation from a provider's historical baseline.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyResult {
    pub provider_id: String,
    pub kind: AnomalyKind,
    pub severity: Severity,
    /// In [0, 1]; only values at/above the confidence threshold are emitted.
    pub confidence: f64,
    /// Normalized deviation behind the severity mapping.
    pub deviation: f64,
    pub baseline: MetricsSnapshot,
    pub observed: MetricsSnapshot,
    pub recommendation: String,
    pub detected_at_ms: u64,
}

/// Entry of the bounded learning history.
#[derive(Debug, Clone, Copy)]
struct HistorySample {
    at_ms: u64,
    latency_ms: f64,
    error_rate: f64,
}

/// Maintains rolling baselines per provider and flags deviations.
pub struct AnomalyDetector {
    repo: Arc<dyn ProviderRepository>,
    config: AnomalyConfig,
    baselines: DashMap<String, ProviderBaseline>,
    thresholds: ThresholdTable,
    // Mutated only inside the batch pass; never held across an await.
    history: Mutex<HashMap<String, VecDeque<HistorySample>>>,
}

impl AnomalyDetector {
    pub fn new(repo: Arc<dyn ProviderRepository>, config: AnomalyConfig) -> Self {
        Self {
            repo,
            config,
            baselines: DashMap::new(),
            thresholds: ThresholdTable::new(),
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Run one detection cycle over the observed providers.
    ///
    /// Detection failures for individual providers are logged and skipped.
    /// The batch ends by recording the observations into the learning
    /// history and adapting thresholds in a single atomic publish.
    pub async fn detect_anomalies(&self, observations: &[ProviderObservation]) -> Vec<AnomalyResult> {
        let mut results = Vec::new();

        for observation in observations {
            match self.detect_for(observation).await {
                Ok(mut anomalies) => results.append(&mut anomalies),
                Err(error) => {
                    tracing::warn!(
                        provider = %observation.provider_id,
                        error = %error,
                        "Anomaly detection failed for provider, continuing batch"
                    );
                }
            }
        }

        self.record_history(observations);
        self.adapt_thresholds();

        if !results.is_empty() {
            tracing::info!(count = results.len(), "Anomalies detected this cycle");
        }
        results
    }

    /// Current baseline for a provider, if one has been built.
    pub fn baseline(&self, provider_id: &str) -> Option<ProviderBaseline> {
        self.baselines.get(provider_id).map(|b| b.clone())
    }

    /// Current thresholds for a provider (adapted or defaults).
    pub fn thresholds_for(&self, provider_id: &str) -> AdaptiveThresholds {
        self.thresholds.get(provider_id, &self.config)
    }

    pub fn reset(&self) {
        self.baselines.clear();
        self.thresholds.reset();
        self.lock_history().clear();
    }

    async fn detect_for(
        &self,
        observation: &ProviderObservation,
    ) -> Result<Vec<AnomalyResult>, CallError> {
        let baseline = self.refresh_baseline(&observation.provider_id).await?;
        if baseline.sample_size < self.config.min_samples {
            tracing::debug!(
                provider = %observation.provider_id,
                samples = baseline.sample_size,
                "Insufficient history, skipping detection"
            );
            return Ok(Vec::new());
        }

        let thresholds = self.thresholds.get(&observation.provider_id, &self.config);
        let observed = observation.snapshot();
        let baseline_snapshot = MetricsSnapshot {
            latency_ms: baseline.average_latency_ms,
            error_rate: baseline.error_rate,
            availability: baseline.availability,
        };
        let mut anomalies = Vec::new();

        // Latency spike: ratio of current to baseline latency.
        if baseline.average_latency_ms > 0.0 && observed.latency_ms > 0.0 {
            let ratio = observed.latency_ms / baseline.average_latency_ms;
            if ratio > thresholds.latency_multiplier {
                let confidence = ((ratio - 1.0).abs() / thresholds.latency_multiplier).min(1.0);
                let deviation = ratio - 1.0;
                self.push_if_confident(
                    &mut anomalies,
                    observation,
                    AnomalyKind::LatencySpike,
                    confidence,
                    deviation,
                    &thresholds,
                    baseline_snapshot,
                    observed,
                );
            }
        }

        // Error-rate increase: above threshold and materially over baseline.
        let increase = observed.error_rate - baseline.error_rate;
        if observed.error_rate > thresholds.error_rate_threshold && increase > 0.05 {
            let confidence = (increase / thresholds.error_rate_threshold).min(1.0);
            let deviation = increase / thresholds.error_rate_threshold;
            self.push_if_confident(
                &mut anomalies,
                observation,
                AnomalyKind::ErrorRateIncrease,
                confidence,
                deviation,
                &thresholds,
                baseline_snapshot,
                observed,
            );
        }

        // Availability drop: below threshold and materially under baseline.
        let drop = baseline.availability - observed.availability;
        if observed.availability < thresholds.availability_threshold && drop > 0.10 {
            let confidence = drop.min(1.0);
            let deviation = drop / 0.10;
            self.push_if_confident(
                &mut anomalies,
                observation,
                AnomalyKind::AvailabilityDrop,
                confidence,
                deviation,
                &thresholds,
                baseline_snapshot,
                observed,
            );
        }

        Ok(anomalies)
    }

    #[allow(clippy::too_many_arguments)]
    fn push_if_confident(
        &self,
        anomalies: &mut Vec<AnomalyResult>,
        observation: &ProviderObservation,
        kind: AnomalyKind,
        confidence: f64,
        deviation: f64,
        thresholds: &AdaptiveThresholds,
        baseline: MetricsSnapshot,
        observed: MetricsSnapshot,
    ) {
        if confidence < thresholds.confidence_threshold {
            return;
        }
        let severity = severity_for(deviation);
        tracing::warn!(
            provider = %observation.provider_id,
            kind = %kind,
            severity = %severity,
            confidence = confidence,
            deviation = deviation,
            "Anomaly detected"
        );
        anomalies.push(AnomalyResult {
            provider_id: observation.provider_id.clone(),
            kind,
            severity,
            confidence,
            deviation,
            baseline,
            observed,
            recommendation: recommendation(kind, severity),
            detected_at_ms: unix_ms(SystemTime::now()),
        });
    }

    async fn refresh_baseline(&self, provider_id: &str) -> Result<ProviderBaseline, CallError> {
        let stats = self
            .repo
            .history_stats(provider_id, self.config.history_window())
            .await?;
        let baseline = ProviderBaseline::from_stats(provider_id, &stats);
        self.baselines.insert(provider_id.to_string(), baseline.clone());
        Ok(baseline)
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<HistorySample>>> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record_history(&self, observations: &[ProviderObservation]) {
        let now_ms = unix_ms(SystemTime::now());
        let window_ms = self.config.history_window_ms;
        let mut history = self.lock_history();

        for observation in observations {
            let samples = history
                .entry(observation.provider_id.clone())
                .or_default();
            samples.push_back(HistorySample {
                at_ms: now_ms,
                latency_ms: observation.latency_ms,
                error_rate: observation.error_rate,
            });
            while let Some(front) = samples.front() {
                if now_ms.saturating_sub(front.at_ms) > window_ms {
                    samples.pop_front();
                } else {
                    break;
                }
            }
        }
    }

    /// One adaptation step: move thresholds a fraction of the way toward
    /// targets derived from the coefficient of variation of recent history,
    /// then publish the whole table at once.
    fn adapt_thresholds(&self) {
        let rate = self.config.adaptation_rate;
        let history = self.lock_history();
        let mut table: HashMap<String, AdaptiveThresholds> =
            self.thresholds.snapshot().as_ref().clone();

        for (provider_id, samples) in history.iter() {
            if samples.len() < 2 {
                continue;
            }
            let current = self.thresholds.get(provider_id, &self.config);

            let latencies: Vec<f64> = samples.iter().map(|s| s.latency_ms).collect();
            let latency_cv = coefficient_of_variation(&latencies);
            let (lo, hi) = LATENCY_MULTIPLIER_BOUNDS;
            let latency_target = (lo + 2.0 * latency_cv).clamp(lo, hi);
            let latency_multiplier =
                (current.latency_multiplier + rate * (latency_target - current.latency_multiplier))
                    .clamp(lo, hi);

            let error_rates: Vec<f64> = samples.iter().map(|s| s.error_rate).collect();
            let (mean, std_dev) = mean_and_std(&error_rates);
            let (lo, hi) = ERROR_RATE_BOUNDS;
            let error_target = (mean + 2.0 * std_dev).clamp(lo, hi);
            let error_rate_threshold = (current.error_rate_threshold
                + rate * (error_target - current.error_rate_threshold))
                .clamp(lo, hi);

            table.insert(
                provider_id.clone(),
                AdaptiveThresholds {
                    latency_multiplier,
                    error_rate_threshold,
                    ..current
                },
            );
        }
        drop(history);

        self.thresholds.publish(table);
    }
}

/// Monotonic step function of the normalized deviation.
fn severity_for(deviation: f64) -> Severity {
    if deviation > 2.0 {
        Severity::Critical
    } else if deviation > 1.0 {
        Severity::High
    } else if deviation > 0.5 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn recommendation(kind: AnomalyKind, severity: Severity) -> String {
    let urgency = match severity {
        Severity::Critical => "immediately",
        Severity::High => "as soon as possible",
        Severity::Medium => "during the next maintenance window",
        Severity::Low => "when convenient",
    };
    match kind {
        AnomalyKind::LatencySpike => format!(
            "Latency is well above the historical baseline; investigate provider load and rerouting options {}.",
            urgency
        ),
        AnomalyKind::ErrorRateIncrease => format!(
            "Error rate has risen significantly over baseline; review provider status and recent changes {}.",
            urgency
        ),
        AnomalyKind::AvailabilityDrop => format!(
            "Availability has dropped below its historical level; verify provider reachability {}.",
            urgency
        ),
    }
}

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    (mean, variance.sqrt())
}

fn coefficient_of_variation(values: &[f64]) -> f64 {
    let (mean, std_dev) = mean_and_std(values);
    if mean.abs() < f64::EPSILON {
        0.0
    } else {
        std_dev / mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::HistoryStats;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedRepo {
        latency_ms: f64,
        uptime: f64,
        checks: u64,
    }

    #[async_trait]
    impl ProviderRepository for FixedRepo {
        async fn list_all(&self) -> Result<Vec<crate::provider::Provider>, CallError> {
            Ok(Vec::new())
        }

        async fn history_stats(
            &self,
            _provider_id: &str,
            _since: Duration,
        ) -> Result<HistoryStats, CallError> {
            Ok(HistoryStats {
                average_latency_ms: self.latency_ms,
                uptime: self.uptime,
                total_checks: self.checks,
            })
        }
    }

    struct FailingRepo;

    #[async_trait]
    impl ProviderRepository for FailingRepo {
        async fn list_all(&self) -> Result<Vec<crate::provider::Provider>, CallError> {
            Err(CallError::Network("store unreachable".into()))
        }

        async fn history_stats(
            &self,
            _provider_id: &str,
            _since: Duration,
        ) -> Result<HistoryStats, CallError> {
            Err(CallError::Network("store unreachable".into()))
        }
    }

    fn observation(id: &str, latency_ms: f64, error_rate: f64, healthy: bool) -> ProviderObservation {
        ProviderObservation {
            provider_id: id.to_string(),
            latency_ms,
            error_rate,
            healthy,
        }
    }

    #[tokio::test]
    async fn test_latency_spike_detected() {
        let repo = Arc::new(FixedRepo {
            latency_ms: 100.0,
            uptime: 1.0,
            checks: 200,
        });
        let detector = AnomalyDetector::new(repo, AnomalyConfig::default());

        let anomalies = detector
            .detect_anomalies(&[observation("p1", 400.0, 0.0, true)])
            .await;

        assert_eq!(anomalies.len(), 1);
        let anomaly = &anomalies[0];
        assert_eq!(anomaly.kind, AnomalyKind::LatencySpike);
        assert!(anomaly.confidence >= 0.7);
        assert_eq!(anomaly.severity, Severity::Critical);
        assert_eq!(anomaly.observed.latency_ms, 400.0);
    }

    #[tokio::test]
    async fn test_insufficient_samples_disables_detection() {
        let repo = Arc::new(FixedRepo {
            latency_ms: 100.0,
            uptime: 1.0,
            checks: 10, // below min_samples = 50
        });
        let detector = AnomalyDetector::new(repo, AnomalyConfig::default());

        let anomalies = detector
            .detect_anomalies(&[observation("p1", 10_000.0, 0.9, false)])
            .await;
        assert!(anomalies.is_empty());
    }

    #[tokio::test]
    async fn test_error_rate_increase() {
        let repo = Arc::new(FixedRepo {
            latency_ms: 100.0,
            uptime: 0.99,
            checks: 500,
        });
        let detector = AnomalyDetector::new(repo, AnomalyConfig::default());

        let anomalies = detector
            .detect_anomalies(&[observation("p1", 100.0, 0.4, true)])
            .await;

        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::ErrorRateIncrease);
    }

    #[tokio::test]
    async fn test_availability_drop() {
        let repo = Arc::new(FixedRepo {
            latency_ms: 100.0,
            uptime: 0.99,
            checks: 500,
        });
        let detector = AnomalyDetector::new(repo, AnomalyConfig::default());

        let anomalies = detector
            .detect_anomalies(&[observation("p1", 100.0, 0.0, false)])
            .await;

        assert_eq!(anomalies.len(), 1);
        let anomaly = &anomalies[0];
        assert_eq!(anomaly.kind, AnomalyKind::AvailabilityDrop);
        assert_eq!(anomaly.severity, Severity::Critical);
    }

    #[tokio::test]
    async fn test_repo_failure_skips_provider_not_batch() {
        let detector = AnomalyDetector::new(Arc::new(FailingRepo), AnomalyConfig::default());

        let anomalies = detector
            .detect_anomalies(&[
                observation("p1", 400.0, 0.0, true),
                observation("p2", 400.0, 0.0, true),
            ])
            .await;
        // Both providers fail their baseline refresh; the batch completes.
        assert!(anomalies.is_empty());
    }

    #[tokio::test]
    async fn test_adaptation_stays_bounded() {
        let repo = Arc::new(FixedRepo {
            latency_ms: 100.0,
            uptime: 1.0,
            checks: 200,
        });
        let detector = AnomalyDetector::new(repo, AnomalyConfig::default());

        // Highly variable latencies push the multiplier target upward.
        for latency in [50.0, 400.0, 30.0, 500.0, 60.0] {
            detector
                .detect_anomalies(&[observation("p1", latency, 0.0, true)])
                .await;
        }

        let thresholds = detector.thresholds_for("p1");
        assert!(thresholds.latency_multiplier >= LATENCY_MULTIPLIER_BOUNDS.0);
        assert!(thresholds.latency_multiplier <= LATENCY_MULTIPLIER_BOUNDS.1);
        assert!(thresholds.error_rate_threshold >= ERROR_RATE_BOUNDS.0);
        assert!(thresholds.error_rate_threshold <= ERROR_RATE_BOUNDS.1);
        // Adaptation actually moved the multiplier off its default.
        assert!(thresholds.latency_multiplier > AnomalyConfig::default().latency_multiplier);
    }

    #[test]
    fn test_severity_steps() {
        assert_eq!(severity_for(0.3), Severity::Low);
        assert_eq!(severity_for(0.7), Severity::Medium);
        assert_eq!(severity_for(1.5), Severity::High);
        assert_eq!(severity_for(3.0), Severity::Critical);
    }
}
