//! Bounded retry execution with per-operation stats.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use crate::config::RetryConfig;
use crate::error::ResilienceError;
use crate::event::{emit, EngineEvent, EventHook};

use super::backoff::calculate_backoff;

/// Predicate deciding whether an error is worth another attempt.
pub type RetryClassifier = Arc<dyn Fn(&ResilienceError) -> bool + Send + Sync>;

/// Aggregate retry counters for one operation name.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RetryStats {
    /// Calls that went through the executor.
    pub total_calls: u64,
    /// Calls that succeeded after at least one retry.
    pub successful_retries: u64,
    /// Calls that consumed all attempts and still failed.
    pub failed_retries: u64,
    /// Attempts summed over all calls.
    pub total_attempts: u64,
}

impl RetryStats {
    pub fn average_attempts(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.total_attempts as f64 / self.total_calls as f64
        }
    }
}

/// Wraps a callable with bounded retry and backoff.
pub struct RetryExecutor {
    stats: DashMap<String, RetryStats>,
    classifier: RetryClassifier,
    hook: Option<EventHook>,
}

impl RetryExecutor {
    pub fn new(hook: Option<EventHook>) -> Self {
        Self::with_classifier(hook, Arc::new(ResilienceError::is_retryable))
    }

    /// Use a caller-supplied retryability predicate instead of the default
    /// classification on [`ResilienceError`].
    pub fn with_classifier(hook: Option<EventHook>, classifier: RetryClassifier) -> Self {
        Self {
            stats: DashMap::new(),
            classifier,
            hook,
        }
    }

    /// Attempt `op` up to `config.max_attempts` times.
    ///
    /// Non-retryable errors propagate immediately without consuming further
    /// attempts; exhaustion fails with [`ResilienceError::RetriesExhausted`]
    /// wrapping the last underlying error.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        operation: &str,
        config: &RetryConfig,
        op: F,
    ) -> Result<T, ResilienceError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match op().await {
                Ok(value) => {
                    self.record(operation, attempt, attempt > 1, false);
                    return Ok(value);
                }
                Err(error) => {
                    if !(self.classifier)(&error) {
                        self.record(operation, attempt, false, false);
                        return Err(error);
                    }
                    if attempt >= config.max_attempts {
                        self.record(operation, attempt, false, true);
                        tracing::warn!(
                            operation = %operation,
                            attempts = attempt,
                            error = %error,
                            "Retries exhausted"
                        );
                        emit(
                            &self.hook,
                            EngineEvent::RetryExhausted {
                                operation: operation.to_string(),
                                attempts: attempt,
                            },
                        );
                        return Err(ResilienceError::RetriesExhausted {
                            operation: operation.to_string(),
                            attempts: attempt,
                            last: Box::new(error),
                        });
                    }

                    let delay = calculate_backoff(attempt, config);
                    tracing::debug!(
                        operation = %operation,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying after backoff"
                    );
                    emit(
                        &self.hook,
                        EngineEvent::RetryScheduled {
                            operation: operation.to_string(),
                            attempt,
                            delay,
                            error: error.to_string(),
                        },
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn record(&self, operation: &str, attempts: u32, retried_success: bool, exhausted: bool) {
        let mut entry = self.stats.entry(operation.to_string()).or_default();
        entry.total_calls += 1;
        entry.total_attempts += attempts as u64;
        if retried_success {
            entry.successful_retries += 1;
        }
        if exhausted {
            entry.failed_retries += 1;
        }
    }

    /// Aggregate counters for one operation name.
    pub fn stats(&self, operation: &str) -> Option<RetryStats> {
        self.stats.get(operation).map(|s| *s)
    }

    pub fn reset(&self) {
        self.stats.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            enabled: true,
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
            jitter_max_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let executor = RetryExecutor::new(None);
        let calls = AtomicU32::new(0);

        let result = executor
            .execute_with_retry("fetch", &fast_config(3), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ResilienceError::Call(CallError::Status(503)))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let stats = executor.stats("fetch").unwrap();
        assert_eq!(stats.successful_retries, 1);
        assert_eq!(stats.total_attempts, 3);
    }

    #[tokio::test]
    async fn test_exhaustion_wraps_last_error() {
        let executor = RetryExecutor::new(None);

        let result: Result<(), _> = executor
            .execute_with_retry("fetch", &fast_config(3), || async {
                Err(ResilienceError::Call(CallError::Network("down".into())))
            })
            .await;

        match result {
            Err(ResilienceError::RetriesExhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, ResilienceError::Call(CallError::Network(_))));
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
        assert_eq!(executor.stats("fetch").unwrap().failed_retries, 1);
    }

    #[tokio::test]
    async fn test_non_retryable_short_circuits() {
        let executor = RetryExecutor::new(None);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = executor
            .execute_with_retry("fetch", &fast_config(5), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ResilienceError::Call(CallError::Status(400))) }
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::Call(CallError::Status(400)))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
