//! Explicit environment handle.
//!
//! The source this engine is modeled on reaches for package-level loggers
//! and singletons. Instead every component here takes an [`Env`] by
//! reference: a clock (for testable timing), an RNG seed (for deterministic
//! backoff/jitter), and an optional results sink. Logging itself stays on
//! `tracing`'s ambient subscriber — that *is* the pack's idiom for logging,
//! so `Env` does not wrap it, it just carries the handles that can't be
//! global without breaking determinism.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::Notify;

use crate::sink::ResultsSink;

/// A source of monotonic time, abstracted so tests can't be flaky on wall
/// clock jitter and so the engine never calls `Instant::now()` directly.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Cooperative cancellation token.
///
/// Propagates from the run root down through the progressive engine, band
/// runner, worker pool, and into plugin `run` calls. Cloning shares the
/// same underlying state; cancellation is irreversible.
#[derive(Clone, Debug)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// A fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Signal cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Whether cancellation has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel()` has been called. Resolves immediately if
    /// already cancelled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        // Race the notification against a re-check: `notify_waiters` only
        // wakes tasks already waiting, so check again after subscribing to
        // avoid missing a cancel that landed between the check above and
        // the await below.
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// Sleep for `dur`, returning early if cancellation fires first.
    /// Returns `true` if the sleep completed, `false` if canceled.
    pub async fn sleep(&self, dur: std::time::Duration) -> bool {
        tokio::select! {
            () = tokio::time::sleep(dur) => true,
            () = self.cancelled() => false,
        }
    }
}

/// Environment handle threaded through every component.
///
/// Breaks the "global mutable state" pattern the source relies on: instead
/// of package-level singletons, every component borrows the same `Env`.
#[derive(Clone)]
pub struct Env {
    /// Monotonic clock used for all duration measurements.
    pub clock: Arc<dyn Clock>,
    /// Seed for any component that needs reproducible randomness (retry
    /// jitter, synthetic workload generation in tests).
    pub rng_seed: u64,
    /// Optional write-only results sink invoked at end-of-run.
    pub results_sink: Option<Arc<dyn ResultsSink>>,
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("rng_seed", &self.rng_seed)
            .field("results_sink", &self.results_sink.is_some())
            .finish()
    }
}

impl Default for Env {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            rng_seed: 0,
            results_sink: None,
        }
    }
}

impl Env {
    /// Build a fresh `StdRng` seeded from this environment. Each call
    /// produces an independent generator seeded deterministically off
    /// `rng_seed` combined with `salt`, so concurrent callers don't share
    /// mutable RNG state.
    #[must_use]
    pub fn rng(&self, salt: u64) -> StdRng {
        StdRng::seed_from_u64(self.rng_seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(salt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_token_wakes_waiters() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        tokio::task::yield_now().await;
        token.cancel();
        handle.await.unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_token_immediate_if_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        // Must not hang.
        token.cancelled().await;
    }

    #[tokio::test]
    async fn sleep_returns_false_on_cancel() {
        let token = CancelToken::new();
        let waiter = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            waiter.cancel();
        });
        let completed = token.sleep(std::time::Duration::from_secs(5)).await;
        assert!(!completed);
    }

    #[test]
    fn rng_is_deterministic_per_seed_and_salt() {
        let env = Env {
            rng_seed: 42,
            ..Env::default()
        };
        use rand::Rng;
        let mut a = env.rng(1);
        let mut b = env.rng(1);
        let x: u64 = a.gen();
        let y: u64 = b.gen();
        assert_eq!(x, y);
    }
}
