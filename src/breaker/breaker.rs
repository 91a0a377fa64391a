//! The per-key circuit breaker.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Instant, SystemTime};

use crate::config::BreakerConfig;
use crate::error::{CallError, ResilienceError};
use crate::event::{emit, EngineEvent, EventHook};

use super::state::{BreakerRecord, BreakerSnapshot, CircuitState};

/// State machine guarding a single protected operation key.
///
/// The record mutex is only held for admission and bookkeeping; the
/// protected call itself runs lock-free, so concurrent calls against the
/// same key never serialize on each other's transport latency.
pub struct CircuitBreaker {
    key: String,
    config: BreakerConfig,
    record: Mutex<BreakerRecord>,
    hook: Option<EventHook>,
}

impl CircuitBreaker {
    pub fn new(key: impl Into<String>, config: BreakerConfig, hook: Option<EventHook>) -> Self {
        Self {
            key: key.into(),
            config,
            record: Mutex::new(BreakerRecord::new()),
            hook,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Run `op` under the breaker's protection.
    ///
    /// Fails with [`ResilienceError::CircuitOpen`] without invoking `op`
    /// while the circuit is open and the cooldown has not elapsed, with
    /// [`ResilienceError::Timeout`] when `op` exceeds the call timeout, and
    /// otherwise propagates the operation's own error.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        self.admit()?;

        let limit = self.config.call_timeout();
        match tokio::time::timeout(limit, op()).await {
            Ok(Ok(value)) => {
                self.on_success();
                Ok(value)
            }
            Ok(Err(err)) => {
                self.on_failure(&err.to_string());
                Err(ResilienceError::Call(err))
            }
            Err(_) => {
                // The future was dropped at the deadline; the underlying
                // transport work is not guaranteed to be interrupted.
                self.on_failure("call timeout");
                Err(ResilienceError::Timeout {
                    key: self.key.clone(),
                    limit,
                })
            }
        }
    }

    /// Current read-only view of the breaker.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let record = self.lock();
        BreakerSnapshot::from_record(&self.key, &record)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerRecord> {
        self.record.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Admission check; performs the lazy Open → HalfOpen transition.
    fn admit(&self) -> Result<(), ResilienceError> {
        let mut record = self.lock();
        record.totals.requests += 1;

        match record.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let now = Instant::now();
                // Open implies next_attempt is set; a missing value means the
                // cooldown is over.
                let due = record.next_attempt.map_or(true, |at| now >= at);
                if due {
                    let event =
                        self.transition(&mut record, CircuitState::HalfOpen, "recovery timeout elapsed");
                    drop(record);
                    if let Some(event) = event {
                        emit(&self.hook, event);
                    }
                    Ok(())
                } else {
                    record.totals.rejections += 1;
                    let retry_after = record
                        .next_attempt
                        .map(|at| at.saturating_duration_since(now))
                        .unwrap_or_default();
                    drop(record);
                    tracing::debug!(key = %self.key, "Circuit open, rejecting call");
                    emit(&self.hook, EngineEvent::BreakerRejected { key: self.key.clone() });
                    Err(ResilienceError::CircuitOpen {
                        key: self.key.clone(),
                        retry_after,
                    })
                }
            }
        }
    }

    fn on_success(&self) {
        let mut events = vec![EngineEvent::BreakerCallSucceeded { key: self.key.clone() }];
        let mut record = self.lock();
        record.last_success = Some(SystemTime::now());
        record.totals.successes += 1;

        match record.state {
            CircuitState::Closed => {
                // A success resets the rolling failure window.
                record.failures.clear();
            }
            CircuitState::HalfOpen => {
                record.half_open_successes += 1;
                if record.half_open_successes >= self.config.success_threshold {
                    events.extend(self.transition(
                        &mut record,
                        CircuitState::Closed,
                        "probe successes reached threshold",
                    ));
                }
            }
            CircuitState::Open => {}
        }
        drop(record);

        for event in events {
            emit(&self.hook, event);
        }
    }

    fn on_failure(&self, reason: &str) {
        let mut events = vec![EngineEvent::BreakerCallFailed {
            key: self.key.clone(),
            error: reason.to_string(),
        }];
        let mut record = self.lock();
        record.last_failure = Some(SystemTime::now());
        record.totals.failures += 1;

        match record.state {
            CircuitState::Closed => {
                let now = Instant::now();
                record.failures.push_back(now);
                self.prune_window(&mut record, now);

                if record.failures.len() as u32 >= self.config.failure_threshold {
                    let reason = format!(
                        "{} failures within monitoring period (last: {})",
                        record.failures.len(),
                        reason
                    );
                    events.extend(self.transition(&mut record, CircuitState::Open, &reason));
                }
            }
            CircuitState::HalfOpen => {
                let reason = format!("probe failed: {}", reason);
                events.extend(self.transition(&mut record, CircuitState::Open, &reason));
            }
            CircuitState::Open => {}
        }
        drop(record);

        for event in events {
            emit(&self.hook, event);
        }
    }

    /// Drop window entries older than the monitoring period.
    fn prune_window(&self, record: &mut BreakerRecord, now: Instant) {
        let period = self.config.monitoring_period();
        while let Some(oldest) = record.failures.front() {
            if now.duration_since(*oldest) >= period {
                record.failures.pop_front();
            } else {
                break;
            }
        }
    }

    /// Apply a state change and hand back the event to emit once the
    /// record guard is dropped; hooks must never run under the lock.
    fn transition(
        &self,
        record: &mut BreakerRecord,
        to: CircuitState,
        reason: &str,
    ) -> Option<EngineEvent> {
        let from = record.state;
        if from == to {
            return None;
        }

        record.state = to;
        record.state_changed = SystemTime::now();
        record.half_open_successes = 0;
        record.next_attempt = match to {
            CircuitState::Open => Some(Instant::now() + self.config.recovery_timeout()),
            _ => None,
        };
        if to == CircuitState::Closed {
            record.failures.clear();
        }

        tracing::info!(
            key = %self.key,
            from = %from,
            to = %to,
            reason = %reason,
            "Circuit breaker transition"
        );
        Some(EngineEvent::BreakerTransition {
            key: self.key.clone(),
            from,
            to,
            reason: reason.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn test_config() -> BreakerConfig {
        BreakerConfig {
            enabled: true,
            failure_threshold: 3,
            success_threshold: 2,
            recovery_timeout_ms: 200,
            monitoring_period_ms: 60_000,
            call_timeout_ms: 1_000,
        }
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), ResilienceError> {
        breaker
            .execute(|| async { Err::<(), _>(CallError::Network("refused".into())) })
            .await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<(), ResilienceError> {
        breaker.execute(|| async { Ok(()) }).await
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new("p1:fetch", test_config(), None);

        for _ in 0..3 {
            assert!(fail(&breaker).await.is_err());
        }
        assert_eq!(breaker.snapshot().state, CircuitState::Open);

        // Further calls are rejected without invoking the operation.
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = breaker
            .execute(move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;
        assert!(matches!(result, Err(ResilienceError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.snapshot().totals.rejections, 1);
    }

    #[tokio::test]
    async fn test_half_open_recovery() {
        let breaker = CircuitBreaker::new("p1:fetch", test_config(), None);
        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.snapshot().state, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(250)).await;

        // First call after the recovery timeout is admitted as a probe.
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.snapshot().state, CircuitState::HalfOpen);

        // Second consecutive success closes the circuit.
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.snapshot().state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("p1:fetch", test_config(), None);
        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;

        let _ = fail(&breaker).await;
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert!(snapshot.next_attempt_in_ms.is_some());
    }

    #[tokio::test]
    async fn test_success_resets_window() {
        let breaker = CircuitBreaker::new("p1:fetch", test_config(), None);
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        succeed(&breaker).await.unwrap();
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;

        // Two failures after a reset never reach the threshold of three.
        assert_eq!(breaker.snapshot().state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_call_timeout_counts_as_failure() {
        let mut config = test_config();
        config.call_timeout_ms = 50;
        let breaker = CircuitBreaker::new("p1:fetch", config, None);

        let result: Result<(), _> = breaker
            .execute(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ResilienceError::Timeout { .. })));
        assert_eq!(breaker.snapshot().failure_count, 1);
    }

    #[tokio::test]
    async fn test_per_call_results_reach_hook() {
        let successes = Arc::new(AtomicU32::new(0));
        let failures = Arc::new(AtomicU32::new(0));
        let (s, f) = (successes.clone(), failures.clone());
        let hook: EventHook = Arc::new(move |event| match event {
            EngineEvent::BreakerCallSucceeded { .. } => {
                s.fetch_add(1, Ordering::SeqCst);
            }
            EngineEvent::BreakerCallFailed { .. } => {
                f.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        });
        let breaker = CircuitBreaker::new("p1:fetch", test_config(), Some(hook));

        // One sub-threshold failure and one success, no transition involved.
        let _ = fail(&breaker).await;
        succeed(&breaker).await.unwrap();

        assert_eq!(breaker.snapshot().state, CircuitState::Closed);
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert_eq!(successes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hook_may_read_breaker_state() {
        // A hook that snapshots the breaker it was installed on must not
        // deadlock against the record mutex.
        let slot: Arc<std::sync::Mutex<Option<Arc<CircuitBreaker>>>> =
            Arc::new(std::sync::Mutex::new(None));
        let observed = Arc::new(AtomicU32::new(0));
        let (s, o) = (slot.clone(), observed.clone());
        let hook: EventHook = Arc::new(move |_event| {
            if let Some(breaker) = s.lock().unwrap().as_ref() {
                let _ = breaker.snapshot();
                o.fetch_add(1, Ordering::SeqCst);
            }
        });
        let breaker = Arc::new(CircuitBreaker::new("p1:fetch", test_config(), Some(hook)));
        *slot.lock().unwrap() = Some(breaker.clone());

        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }
        let _ = fail(&breaker).await; // rejected while open

        assert_eq!(breaker.snapshot().state, CircuitState::Open);
        assert!(observed.load(Ordering::SeqCst) >= 4);
    }

    #[tokio::test]
    async fn test_concurrent_failures_open_once() {
        let hook_count = Arc::new(AtomicU32::new(0));
        let hc = hook_count.clone();
        let hook: EventHook = Arc::new(move |event| {
            if let EngineEvent::BreakerTransition { to: CircuitState::Open, .. } = event {
                hc.fetch_add(1, Ordering::SeqCst);
            }
        });
        let breaker = Arc::new(CircuitBreaker::new("p1:fetch", test_config(), Some(hook)));

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let b = breaker.clone();
            tasks.push(tokio::spawn(async move {
                let _ = b
                    .execute(|| async { Err::<(), _>(CallError::Network("down".into())) })
                    .await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(breaker.snapshot().state, CircuitState::Open);
        assert_eq!(hook_count.load(Ordering::SeqCst), 1, "must not double-open");
    }
}
