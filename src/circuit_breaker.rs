//! Circuit breaker (C2): gates a callable with a three-state machine per
//! name.
//!
//! `Closed -> Open -> HalfOpen -> Closed`, reverting to `Open` on any
//! half-open failure. State transitions are logged via `tracing` and are
//! otherwise only observable through [`CircuitBreaker::state`] /
//! [`CircuitBreaker::metrics`] — never through the return type of
//! `execute`.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{info, warn};

use crate::env::{CancelToken, Clock};
use crate::error::StormError;
use crate::types::CircuitBreakerConfig;

/// Observable state of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Breaker counters, safe to read concurrently with `execute`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BreakerMetrics {
    pub executed: u64,
    pub rejected: u64,
    pub failures: u64,
    pub successes: u64,
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    half_open_successes: u32,
    half_open_inflight: u32,
    last_failure: Option<std::time::Instant>,
    metrics: BreakerMetrics,
}

/// A named circuit breaker wrapping calls to a possibly-flaky dependency
/// (typically a plugin's database-facing call).
pub struct CircuitBreaker {
    name: String,
    cfg: CircuitBreakerConfig,
    clock: std::sync::Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(name: impl Into<String>, cfg: CircuitBreakerConfig, clock: std::sync::Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            cfg,
            clock,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                half_open_successes: 0,
                half_open_inflight: 0,
                last_failure: None,
                metrics: BreakerMetrics::default(),
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    #[must_use]
    pub fn metrics(&self) -> BreakerMetrics {
        self.inner.lock().unwrap().metrics
    }

    /// Decide whether a request is admitted right now, transitioning
    /// `Open -> HalfOpen` if the reset timeout has elapsed. Returns `true`
    /// if the caller may proceed.
    fn admit(&self) -> bool {
        let mut g = self.inner.lock().unwrap();
        match g.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = g
                    .last_failure
                    .map(|t| self.clock.now().saturating_duration_since(t))
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.cfg.reset_timeout {
                    g.state = CircuitState::HalfOpen;
                    g.half_open_successes = 0;
                    g.half_open_inflight = 0;
                    info!(breaker = %self.name, "circuit breaker Open -> HalfOpen");
                    g.half_open_inflight += 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if g.half_open_inflight < self.cfg.half_open_limit {
                    g.half_open_inflight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn on_success(&self) {
        let mut g = self.inner.lock().unwrap();
        g.metrics.executed += 1;
        g.metrics.successes += 1;
        match g.state {
            CircuitState::Closed => {
                g.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                g.half_open_inflight = g.half_open_inflight.saturating_sub(1);
                g.half_open_successes += 1;
                if g.half_open_successes >= self.cfg.half_open_limit {
                    g.state = CircuitState::Closed;
                    g.failure_count = 0;
                    info!(breaker = %self.name, "circuit breaker HalfOpen -> Closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut g = self.inner.lock().unwrap();
        g.metrics.executed += 1;
        g.metrics.failures += 1;
        g.last_failure = Some(self.clock.now());
        match g.state {
            CircuitState::Closed => {
                g.failure_count += 1;
                if g.failure_count >= self.cfg.max_failures {
                    g.state = CircuitState::Open;
                    warn!(breaker = %self.name, failures = g.failure_count, "circuit breaker Closed -> Open");
                }
            }
            CircuitState::HalfOpen => {
                g.half_open_inflight = g.half_open_inflight.saturating_sub(1);
                g.state = CircuitState::Open;
                warn!(breaker = %self.name, "circuit breaker HalfOpen -> Open");
            }
            CircuitState::Open => {}
        }
    }

    /// Execute `f` if admitted. Returns `StormError::CircuitOpen` without
    /// invoking `f` otherwise, and increments `rejected`.
    pub async fn execute<F, Fut, T, E>(&self, f: F) -> Result<T, StormError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        if !self.admit() {
            self.inner.lock().unwrap().metrics.rejected += 1;
            return Err(StormError::CircuitOpen {
                breaker: self.name.clone(),
            });
        }
        match f().await {
            Ok(v) => {
                self.on_success();
                Ok(v)
            }
            Err(e) => {
                self.on_failure();
                Err(StormError::RunFailed(e.to_string()))
            }
        }
    }

    /// As `execute`, but also honors cancellation and a per-call timeout.
    /// A timeout counts as a failure, never as a cancellation.
    pub async fn execute_with_context<F, Fut, T, E>(
        &self,
        cancel: &CancelToken,
        timeout: Duration,
        f: F,
    ) -> Result<T, StormError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        if !self.admit() {
            self.inner.lock().unwrap().metrics.rejected += 1;
            return Err(StormError::CircuitOpen {
                breaker: self.name.clone(),
            });
        }
        let result = tokio::select! {
            r = tokio::time::timeout(timeout, f()) => r,
            () = cancel.cancelled() => {
                // Cancellation pre-empts admission bookkeeping: neither a
                // success nor a failure, the caller is aborting.
                self.inner.lock().unwrap().half_open_inflight_release_if_half_open();
                return Err(StormError::Canceled);
            }
        };
        match result {
            Ok(Ok(v)) => {
                self.on_success();
                Ok(v)
            }
            Ok(Err(e)) => {
                self.on_failure();
                Err(StormError::RunFailed(e.to_string()))
            }
            Err(_elapsed) => {
                self.on_failure();
                Err(StormError::Timeout(timeout))
            }
        }
    }
}

impl Inner {
    fn half_open_inflight_release_if_half_open(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.half_open_inflight = self.half_open_inflight.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::SystemClock;
    use std::sync::Arc;

    fn breaker(max_failures: u32, reset: Duration, half_open_limit: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                max_failures,
                reset_timeout: reset,
                half_open_limit,
            },
            Arc::new(SystemClock),
        )
    }

    #[tokio::test]
    async fn trips_open_after_max_failures() {
        let cb = breaker(3, Duration::from_millis(50), 2);
        for _ in 0..3 {
            let _ = cb
                .execute(|| async { Err::<(), _>("boom") })
                .await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        let result = cb.execute(|| async { Ok::<_, &str>(()) }).await;
        assert!(matches!(result, Err(StormError::CircuitOpen { .. })));
        assert_eq!(cb.metrics().rejected, 1);
    }

    #[tokio::test]
    async fn half_open_after_reset_timeout_then_closes_on_successes() {
        let cb = breaker(3, Duration::from_millis(20), 2);
        for _ in 0..3 {
            let _ = cb.execute(|| async { Err::<(), _>("boom") }).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;

        let _ = cb.execute(|| async { Ok::<_, &str>(()) }).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let _ = cb.execute(|| async { Ok::<_, &str>(()) }).await;
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let cb = breaker(1, Duration::from_millis(10), 2);
        let _ = cb.execute(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(15)).await;
        let _ = cb.execute(|| async { Err::<(), _>("still broken") }).await;
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn timeout_counts_as_failure() {
        let cb = breaker(1, Duration::from_secs(30), 2);
        let cancel = CancelToken::new();
        let result = cb
            .execute_with_context(&cancel, Duration::from_millis(5), || async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<(), &str>(())
            })
            .await;
        assert!(matches!(result, Err(StormError::Timeout(_))));
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn cancellation_is_not_a_failure() {
        let cb = breaker(1, Duration::from_secs(30), 2);
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = cb
            .execute_with_context(&cancel, Duration::from_secs(5), || async {
                Ok::<(), &str>(())
            })
            .await;
        assert!(matches!(result, Err(StormError::Canceled)));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.metrics().failures, 0);
    }

    #[tokio::test]
    async fn rejected_and_executed_sum_to_allowed_requests() {
        let cb = breaker(1, Duration::from_secs(30), 1);
        let _ = cb.execute(|| async { Err::<(), _>("x") }).await;
        for _ in 0..5 {
            let _ = cb.execute(|| async { Ok::<_, &str>(()) }).await;
        }
        let m = cb.metrics();
        assert_eq!(m.rejected + m.executed, 6);
    }
}
