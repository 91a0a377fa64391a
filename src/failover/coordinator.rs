//! Failover execution across candidate providers.

use std::future::Future;
use std::sync::atomic::AtomicUsize;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::FailoverConfig;
use crate::error::{CallError, ResilienceError};
use crate::event::{emit, EngineEvent, EventHook};
use crate::provider::Provider;

use super::cache::ResultCache;
use super::health::{HealthTracker, ProviderHealth};
use super::strategy::{order_candidates, Candidate};

/// One provider attempt inside a failover pass.
#[derive(Debug, Clone, Serialize)]
pub struct FailoverAttempt {
    pub provider_id: String,
    pub attempt: u32,
    pub success: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// Successful result of a failover pass.
#[derive(Debug)]
pub struct FailoverOutcome<T> {
    pub value: T,
    /// Provider that produced the value; `None` when served from cache.
    pub provider_id: Option<String>,
    pub attempts: Vec<FailoverAttempt>,
    pub total_latency: Duration,
    /// True when the value did not come from the first-choice candidate.
    pub fallback_used: bool,
    pub cache_used: bool,
    /// True when the served cache entry had outlived its TTL.
    pub stale: bool,
}

/// Selects and orders candidate providers, tracks their health, and owns the
/// short-lived result cache.
pub struct FailoverCoordinator {
    health: HealthTracker,
    cache: ResultCache,
    rr_index: AtomicUsize,
    hook: Option<EventHook>,
}

impl FailoverCoordinator {
    pub fn new(hook: Option<EventHook>) -> Self {
        Self {
            health: HealthTracker::new(),
            cache: ResultCache::new(),
            rr_index: AtomicUsize::new(0),
            hook,
        }
    }

    /// Try candidates in strategy order until one succeeds.
    ///
    /// A fresh cache entry for `cache_key` short-circuits before any provider
    /// is invoked. Fails only when every eligible candidate has been tried
    /// (bounded by `max_failover_attempts`) and no cache entry, fresh or
    /// stale, is available.
    pub async fn execute_with_failover<T, F, Fut>(
        &self,
        providers: &[Provider],
        op: F,
        operation: &str,
        config: &FailoverConfig,
        cache_key: Option<&str>,
    ) -> Result<FailoverOutcome<T>, ResilienceError>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(Provider) -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let started = Instant::now();

        if config.cache_enabled {
            if let Some(key) = cache_key {
                if let Some((value, false)) = self.cache.get::<T>(key, config.cache_ttl()) {
                    tracing::debug!(operation = %operation, cache_key = %key, "Fresh cache hit, skipping providers");
                    return Ok(FailoverOutcome {
                        value,
                        provider_id: None,
                        attempts: Vec::new(),
                        total_latency: started.elapsed(),
                        fallback_used: false,
                        cache_used: true,
                        stale: false,
                    });
                }
            }
        }

        let candidates: Vec<Candidate> = providers
            .iter()
            .filter_map(|provider| {
                let health = self.health.get_or_default(&provider.id);
                if health.health_score < config.health_threshold {
                    tracing::debug!(provider = %provider.id, score = health.health_score, "Filtered: health score below threshold");
                    return None;
                }
                if health.latency_ms > config.latency_threshold_ms {
                    tracing::debug!(provider = %provider.id, latency_ms = health.latency_ms, "Filtered: latency above threshold");
                    return None;
                }
                if self.health.in_cooldown(&provider.id, config.cooldown()) {
                    tracing::debug!(provider = %provider.id, "Filtered: inside failure cooldown");
                    return None;
                }
                Some(Candidate {
                    provider: provider.clone(),
                    health,
                })
            })
            .collect();

        if candidates.is_empty() {
            if let Some(outcome) = self.serve_stale(operation, config, cache_key, started) {
                return Ok(outcome);
            }
            return Err(ResilienceError::NoHealthyProvider {
                operation: operation.to_string(),
            });
        }

        let ordered = order_candidates(config.strategy, candidates, &self.rr_index);
        let mut attempts = Vec::new();

        for (index, candidate) in ordered
            .iter()
            .take(config.max_failover_attempts as usize)
            .enumerate()
        {
            let provider = &candidate.provider;
            let attempt_number = index as u32 + 1;
            let attempt_started = Instant::now();

            match op(provider.clone()).await {
                Ok(value) => {
                    let latency = attempt_started.elapsed();
                    self.health.record_success(&provider.id, latency);
                    attempts.push(FailoverAttempt {
                        provider_id: provider.id.clone(),
                        attempt: attempt_number,
                        success: true,
                        latency_ms: latency.as_millis() as u64,
                        error: None,
                    });
                    emit(
                        &self.hook,
                        EngineEvent::FailoverAttempt {
                            operation: operation.to_string(),
                            provider_id: provider.id.clone(),
                            attempt: attempt_number,
                            success: true,
                            latency,
                            error: None,
                        },
                    );

                    if config.cache_enabled {
                        if let Some(key) = cache_key {
                            self.cache.store(key, value.clone());
                        }
                    }

                    return Ok(FailoverOutcome {
                        value,
                        provider_id: Some(provider.id.clone()),
                        attempts,
                        total_latency: started.elapsed(),
                        fallback_used: index > 0,
                        cache_used: false,
                        stale: false,
                    });
                }
                Err(error) => {
                    let latency = attempt_started.elapsed();
                    self.health.record_failure(&provider.id);
                    tracing::warn!(
                        operation = %operation,
                        provider = %provider.id,
                        attempt = attempt_number,
                        error = %error,
                        "Failover attempt failed"
                    );
                    emit(
                        &self.hook,
                        EngineEvent::FailoverAttempt {
                            operation: operation.to_string(),
                            provider_id: provider.id.clone(),
                            attempt: attempt_number,
                            success: false,
                            latency,
                            error: Some(error.to_string()),
                        },
                    );
                    attempts.push(FailoverAttempt {
                        provider_id: provider.id.clone(),
                        attempt: attempt_number,
                        success: false,
                        latency_ms: latency.as_millis() as u64,
                        error: Some(error.to_string()),
                    });
                }
            }
        }

        if let Some(mut outcome) = self.serve_stale(operation, config, cache_key, started) {
            outcome.attempts = attempts;
            return Ok(outcome);
        }

        Err(ResilienceError::AllProvidersFailed {
            operation: operation.to_string(),
            attempts: attempts.len() as u32,
        })
    }

    /// Best-effort degradation: serve a cached value regardless of age.
    fn serve_stale<T: Clone + Send + Sync + 'static>(
        &self,
        operation: &str,
        config: &FailoverConfig,
        cache_key: Option<&str>,
        started: Instant,
    ) -> Option<FailoverOutcome<T>> {
        if !config.cache_enabled {
            return None;
        }
        let key = cache_key?;
        let (value, stale) = self.cache.get::<T>(key, config.cache_ttl())?;

        tracing::warn!(
            operation = %operation,
            cache_key = %key,
            stale = stale,
            "All providers failed, serving cached value"
        );
        emit(
            &self.hook,
            EngineEvent::FailoverServedStale {
                operation: operation.to_string(),
                cache_key: key.to_string(),
            },
        );
        Some(FailoverOutcome {
            value,
            provider_id: None,
            attempts: Vec::new(),
            total_latency: started.elapsed(),
            fallback_used: true,
            cache_used: true,
            stale,
        })
    }

    pub fn provider_health(&self, provider_id: &str) -> Option<ProviderHealth> {
        self.health.get(provider_id)
    }

    pub fn provider_health_all(&self) -> std::collections::HashMap<String, ProviderHealth> {
        self.health.all()
    }

    pub(crate) fn health_tracker(&self) -> &HealthTracker {
        &self.health
    }

    pub fn reset(&self) {
        self.health.reset();
        self.cache.reset();
    }
}
