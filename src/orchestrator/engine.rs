//! The self-healing orchestrator.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;

use crate::anomaly::{AnomalyDetector, AnomalyResult, ProviderObservation};
use crate::anomaly::detector::Severity;
use crate::audit::{ActionType, AuditSink, SelfHealingAction};
use crate::breaker::{BreakerRegistry, BreakerSnapshot, CircuitState};
use crate::config::EngineConfig;
use crate::error::{CallError, ResilienceError};
use crate::event::{EngineEvent, EventHook};
use crate::failover::{FailoverCoordinator, ProviderHealth};
use crate::provider::{Provider, ProviderRepository};
use crate::retry::{RetryExecutor, RetryStats};
use crate::unix_ms;

/// Result union returned by [`SelfHealingOrchestrator::execute_with_self_healing`].
///
/// Total failure is an ordinary value with every diagnostic field populated,
/// so callers handle the degraded path without exception-style control flow.
#[derive(Debug)]
pub struct SelfHealingResult<T> {
    pub success: bool,
    pub value: Option<T>,
    pub error: Option<String>,
    pub operation: String,
    /// Provider that produced the value, when one did.
    pub provider_id: Option<String>,
    /// Every provider attempted, in order.
    pub providers_used: Vec<String>,
    /// Strategies the pipeline went through, in order.
    pub strategies_used: Vec<&'static str>,
    pub anomalies: Vec<AnomalyResult>,
    /// True when the value came from anything but the first-choice provider.
    pub fallback_used: bool,
    pub cache_used: bool,
    /// True when the served cache entry had outlived its TTL; degraded, not
    /// a regular hit.
    pub stale: bool,
    /// Transport invocations actually made (breaker rejections excluded).
    pub total_attempts: u32,
    pub total_latency: Duration,
}

/// Aggregates over the audit sink's backing store.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SelfHealingStats {
    pub total_actions: u64,
    pub resolved_actions: u64,
    pub critical_actions: u64,
    pub total_failovers: u64,
    pub successful_failovers: u64,
    pub total_anomalies: u64,
    pub resolved_anomalies: u64,
    pub average_recovery_time_ms: f64,
}

/// Composes circuit breaking, retry, failover, and anomaly detection into a
/// single entry point.
pub struct SelfHealingOrchestrator {
    config: EngineConfig,
    breakers: BreakerRegistry,
    retry: RetryExecutor,
    failover: FailoverCoordinator,
    detector: AnomalyDetector,
    repo: Arc<dyn ProviderRepository>,
    sink: Arc<dyn AuditSink>,
}

impl SelfHealingOrchestrator {
    pub fn new(
        repo: Arc<dyn ProviderRepository>,
        sink: Arc<dyn AuditSink>,
        config: EngineConfig,
    ) -> Self {
        let hook: EventHook = {
            let sink = sink.clone();
            Arc::new(move |event| record_event(sink.as_ref(), event))
        };

        Self {
            breakers: BreakerRegistry::new(Some(hook.clone())),
            retry: RetryExecutor::new(Some(hook.clone())),
            failover: FailoverCoordinator::new(Some(hook)),
            detector: AnomalyDetector::new(repo.clone(), config.anomaly.clone()),
            repo,
            sink,
            config,
        }
    }

    /// One detection cycle over every provider known to the repository.
    ///
    /// Intended for the periodic health-check scheduler; detected anomalies
    /// are recorded to the audit sink and returned.
    pub async fn run_detection_cycle(&self) -> Result<Vec<AnomalyResult>, CallError> {
        let providers = self.repo.list_all().await?;
        Ok(self.run_anomaly_pass(&providers, "detection_cycle").await)
    }

    /// Run `op` against the candidate providers with the full pipeline.
    ///
    /// `overrides` replaces the engine-wide config for this call only, with
    /// one exception: breakers bind their thresholds when first created for
    /// a key, so overridden breaker settings only apply to keys this call
    /// sees for the first time (or after [`Self::reset_all`]). The result
    /// cache is keyed by `operation`, so calls sharing an operation name
    /// share cached values.
    pub async fn execute_with_self_healing<T, F, Fut>(
        &self,
        providers: &[Provider],
        op: F,
        operation: &str,
        overrides: Option<&EngineConfig>,
    ) -> SelfHealingResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(Provider) -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let config = overrides.unwrap_or(&self.config);
        let started = Instant::now();
        let attempts = AtomicU32::new(0);
        let mut providers_used: Vec<String> = Vec::new();
        let mut strategies_used: Vec<&'static str> = Vec::new();
        let mut last_error: Option<String> = None;

        // Stage 1: informational anomaly pass over the candidate set.
        let anomalies = if config.anomaly.enabled {
            self.run_anomaly_pass(providers, operation).await
        } else {
            Vec::new()
        };

        // Stage 2: sequential breaker + retry per provider, early exit.
        if config.breaker.enabled && config.retry.enabled {
            strategies_used.push("circuit_breaker_retry");

            for (index, provider) in providers.iter().enumerate() {
                let key = format!("{}:{}", provider.id, operation);
                let breaker = self.breakers.get_or_create(&key, &config.breaker);
                providers_used.push(provider.id.clone());

                let outcome = self
                    .retry
                    .execute_with_retry(operation, &config.retry, || {
                        let breaker = breaker.clone();
                        let provider = provider.clone();
                        let op = &op;
                        let attempts = &attempts;
                        async move {
                            breaker
                                .execute(|| {
                                    attempts.fetch_add(1, Ordering::Relaxed);
                                    op(provider)
                                })
                                .await
                        }
                    })
                    .await;

                match outcome {
                    Ok(value) => {
                        self.on_provider_recovered(&provider.id);
                        self.sink.record_breaker_snapshot(&breaker.snapshot());
                        return SelfHealingResult {
                            success: true,
                            value: Some(value),
                            error: None,
                            operation: operation.to_string(),
                            provider_id: Some(provider.id.clone()),
                            providers_used,
                            strategies_used,
                            anomalies,
                            fallback_used: index > 0,
                            cache_used: false,
                            stale: false,
                            total_attempts: attempts.load(Ordering::Relaxed),
                            total_latency: started.elapsed(),
                        };
                    }
                    Err(error) => {
                        tracing::debug!(
                            operation = %operation,
                            provider = %provider.id,
                            error = %error,
                            "Provider exhausted its circuit+retry budget"
                        );
                        last_error = Some(error.to_string());
                    }
                }
            }
        }

        // Stage 3: coordinated failover over the same provider list.
        if config.failover.enabled {
            let stage2_ran = !strategies_used.is_empty();
            strategies_used.push("failover");

            let outcome = self
                .failover
                .execute_with_failover(
                    providers,
                    |provider| {
                        attempts.fetch_add(1, Ordering::Relaxed);
                        op(provider)
                    },
                    operation,
                    &config.failover,
                    Some(operation),
                )
                .await;

            match outcome {
                Ok(outcome) => {
                    for attempt in &outcome.attempts {
                        if !providers_used.contains(&attempt.provider_id) {
                            providers_used.push(attempt.provider_id.clone());
                        }
                    }
                    if let Some(winner) = &outcome.provider_id {
                        self.on_provider_recovered(winner);
                    }
                    return SelfHealingResult {
                        success: true,
                        value: Some(outcome.value),
                        error: None,
                        operation: operation.to_string(),
                        provider_id: outcome.provider_id,
                        providers_used,
                        strategies_used,
                        anomalies,
                        fallback_used: stage2_ran || outcome.fallback_used,
                        cache_used: outcome.cache_used,
                        stale: outcome.stale,
                        total_attempts: attempts.load(Ordering::Relaxed),
                        total_latency: started.elapsed(),
                    };
                }
                Err(error) => {
                    tracing::warn!(operation = %operation, error = %error, "Failover stage failed");
                    last_error = Some(error.to_string());
                }
            }
        }

        // Stage 4: last resort, each provider once, uncoordinated.
        let earlier_stages_ran = !strategies_used.is_empty();
        strategies_used.push("last_resort");
        for (index, provider) in providers.iter().enumerate() {
            if !providers_used.contains(&provider.id) {
                providers_used.push(provider.id.clone());
            }
            attempts.fetch_add(1, Ordering::Relaxed);
            self.record(
                SelfHealingAction::new(
                    ActionType::LastResortAttempt,
                    "structured strategies exhausted, trying provider directly",
                    Severity::High,
                )
                .with_provider(&provider.id)
                .with_operation(operation),
            );

            match op(provider.clone()).await {
                Ok(value) => {
                    self.on_provider_recovered(&provider.id);
                    return SelfHealingResult {
                        success: true,
                        value: Some(value),
                        error: None,
                        operation: operation.to_string(),
                        provider_id: Some(provider.id.clone()),
                        providers_used,
                        strategies_used,
                        anomalies,
                        fallback_used: earlier_stages_ran || index > 0,
                        cache_used: false,
                        stale: false,
                        total_attempts: attempts.load(Ordering::Relaxed),
                        total_latency: started.elapsed(),
                    };
                }
                Err(error) => {
                    last_error = Some(error.to_string());
                }
            }
        }

        // Terminal failure: structured result, Critical audit record.
        let reason = last_error
            .clone()
            .unwrap_or_else(|| "no providers supplied".to_string());
        let terminal = ResilienceError::AllStrategiesFailed {
            operation: operation.to_string(),
        };
        tracing::error!(operation = %operation, reason = %reason, "All self-healing strategies failed");
        self.record(
            SelfHealingAction::new(
                ActionType::TerminalFailure,
                format!("{}: {}", terminal, reason),
                Severity::Critical,
            )
            .with_operation(operation),
        );

        SelfHealingResult {
            success: false,
            value: None,
            error: Some(terminal.to_string()),
            operation: operation.to_string(),
            provider_id: None,
            providers_used,
            strategies_used,
            anomalies,
            fallback_used: false,
            cache_used: false,
            stale: false,
            total_attempts: attempts.load(Ordering::Relaxed),
            total_latency: started.elapsed(),
        }
    }

    async fn run_anomaly_pass(
        &self,
        providers: &[Provider],
        operation: &str,
    ) -> Vec<AnomalyResult> {
        let observations: Vec<ProviderObservation> = providers
            .iter()
            .map(|provider| {
                let health = self.failover.health_tracker().get_or_default(&provider.id);
                ProviderObservation {
                    provider_id: provider.id.clone(),
                    latency_ms: health.latency_ms as f64,
                    error_rate: health.error_rate,
                    healthy: health.healthy,
                }
            })
            .collect();

        let anomalies = self.detector.detect_anomalies(&observations).await;
        for anomaly in &anomalies {
            self.sink.record_anomaly(anomaly);
            self.record(
                SelfHealingAction::new(
                    ActionType::AnomalyDetected,
                    anomaly.recommendation.clone(),
                    anomaly.severity,
                )
                .with_provider(&anomaly.provider_id)
                .with_operation(operation),
            );
        }
        anomalies
    }

    fn on_provider_recovered(&self, provider_id: &str) {
        self.sink.resolve_for_provider(provider_id);
    }

    fn record(&self, action: SelfHealingAction) {
        self.sink.record_action(action);
    }

    // --- Introspection ---

    /// Read-only view of one breaker, keyed `provider_id:operation`.
    pub fn breaker_status(&self, key: &str) -> Option<BreakerSnapshot> {
        self.breakers.status(key)
    }

    pub fn all_breaker_statuses(&self) -> Vec<BreakerSnapshot> {
        self.breakers.all_statuses()
    }

    pub fn provider_health(&self, provider_id: &str) -> Option<ProviderHealth> {
        self.failover.provider_health(provider_id)
    }

    pub fn provider_health_all(&self) -> HashMap<String, ProviderHealth> {
        self.failover.provider_health_all()
    }

    pub fn retry_stats(&self, operation: &str) -> Option<RetryStats> {
        self.retry.stats(operation)
    }

    /// Aggregate self-healing stats over the trailing `since` window.
    pub fn self_healing_stats(&self, since: Duration) -> SelfHealingStats {
        let since_ms = unix_ms(SystemTime::now()).saturating_sub(since.as_millis() as u64);
        let actions = self.sink.actions_since(since_ms);
        let anomalies = self.sink.anomalies_since(since_ms);

        let mut stats = SelfHealingStats {
            total_actions: actions.len() as u64,
            total_anomalies: anomalies.len() as u64,
            resolved_anomalies: anomalies.iter().filter(|a| a.resolved).count() as u64,
            ..SelfHealingStats::default()
        };

        let mut recovery_total_ms = 0u64;
        let mut recovery_count = 0u64;
        for action in &actions {
            if action.resolved {
                stats.resolved_actions += 1;
                if let Some(resolved_at) = action.resolved_at_ms {
                    recovery_total_ms += resolved_at.saturating_sub(action.at_ms);
                    recovery_count += 1;
                }
            }
            if action.severity == Severity::Critical {
                stats.critical_actions += 1;
            }
            if action.action_type == ActionType::FailoverAttempt {
                stats.total_failovers += 1;
                let succeeded = action
                    .metadata
                    .as_ref()
                    .and_then(|m| m.get("success"))
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                if succeeded {
                    stats.successful_failovers += 1;
                }
            }
        }
        if recovery_count > 0 {
            stats.average_recovery_time_ms = recovery_total_ms as f64 / recovery_count as f64;
        }
        stats
    }

    /// Clear all in-memory breakers, health scores, cooldowns, caches, and
    /// learned baselines. Administrative; idempotent.
    pub fn reset_all(&self) {
        self.breakers.reset();
        self.retry.reset();
        self.failover.reset();
        self.detector.reset();
        tracing::info!("Self-healing engine state reset");
    }
}

/// Translate a component event into an audit action.
fn record_event(sink: &dyn AuditSink, event: &EngineEvent) {
    let action = match event {
        EngineEvent::BreakerTransition { key, from, to, reason } => {
            let severity = match to {
                CircuitState::Open => Severity::High,
                CircuitState::HalfOpen => Severity::Medium,
                CircuitState::Closed => Severity::Low,
            };
            let mut action =
                SelfHealingAction::new(ActionType::BreakerTransition, reason.clone(), severity)
                    .with_states(from.to_string(), to.to_string());
            if let Some((provider_id, operation)) = key.split_once(':') {
                action = action.with_provider(provider_id).with_operation(operation);
            }
            action
        }
        EngineEvent::BreakerRejected { key } => {
            let mut action = SelfHealingAction::new(
                ActionType::BreakerRejection,
                "call rejected while circuit open",
                Severity::Low,
            );
            if let Some((provider_id, operation)) = key.split_once(':') {
                action = action.with_provider(provider_id).with_operation(operation);
            }
            action
        }
        EngineEvent::BreakerCallSucceeded { key } => {
            let mut action = SelfHealingAction::new(
                ActionType::BreakerCallSucceeded,
                "protected call succeeded",
                Severity::Low,
            );
            if let Some((provider_id, operation)) = key.split_once(':') {
                action = action.with_provider(provider_id).with_operation(operation);
            }
            action
        }
        EngineEvent::BreakerCallFailed { key, error } => {
            let mut action = SelfHealingAction::new(
                ActionType::BreakerCallFailed,
                format!("protected call failed: {}", error),
                Severity::Low,
            );
            if let Some((provider_id, operation)) = key.split_once(':') {
                action = action.with_provider(provider_id).with_operation(operation);
            }
            action
        }
        EngineEvent::RetryScheduled { operation, attempt, delay, error } => {
            SelfHealingAction::new(
                ActionType::RetryScheduled,
                format!("attempt {} failed: {}", attempt, error),
                Severity::Low,
            )
            .with_operation(operation)
            .with_metadata(serde_json::json!({
                "attempt": attempt,
                "delay_ms": delay.as_millis() as u64,
            }))
        }
        EngineEvent::RetryExhausted { operation, attempts } => SelfHealingAction::new(
            ActionType::RetryExhausted,
            format!("all {} attempts failed", attempts),
            Severity::High,
        )
        .with_operation(operation),
        EngineEvent::FailoverAttempt {
            operation,
            provider_id,
            attempt,
            success,
            latency,
            error,
        } => {
            let severity = if *success { Severity::Low } else { Severity::Medium };
            let reason = match error {
                Some(error) => format!("failover attempt {} failed: {}", attempt, error),
                None => format!("failover attempt {} succeeded", attempt),
            };
            SelfHealingAction::new(ActionType::FailoverAttempt, reason, severity)
                .with_provider(provider_id)
                .with_operation(operation)
                .with_metadata(serde_json::json!({
                    "attempt": attempt,
                    "success": success,
                    "latency_ms": latency.as_millis() as u64,
                }))
        }
        EngineEvent::FailoverServedStale { operation, cache_key } => SelfHealingAction::new(
            ActionType::StaleCacheServed,
            format!("served cached value for '{}' after provider exhaustion", cache_key),
            Severity::High,
        )
        .with_operation(operation),
    };

    sink.record_action(action);
}
