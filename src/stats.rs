//! Constant-memory descriptive statistics with bounded percentile
//! estimation (C1).
//!
//! Mean/variance use Welford's online recurrence so a single pass never
//! suffers the catastrophic cancellation of the naive
//! `sum(x^2)/n - mean^2` formula. Percentiles retain only the most recent
//! `N` samples (FIFO) and sort lazily — the teacher's own
//! `calculate_operational_result` takes the same sort-then-index approach,
//! just as a one-shot end-of-run computation instead of a standing window.

use std::sync::Mutex;

/// A coherent, non-torn view of the collector's state at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsSnapshot {
    pub count: u64,
    pub mean: f64,
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
}

struct Inner {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
    window: std::collections::VecDeque<f64>,
    capacity: usize,
    sorted: Vec<f64>,
    dirty: bool,
}

impl Inner {
    fn new(capacity: usize) -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            window: std::collections::VecDeque::with_capacity(capacity.min(4096)),
            capacity: capacity.max(1),
            sorted: Vec::new(),
            dirty: false,
        }
    }

    fn record(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
        if x < self.min {
            self.min = x;
        }
        if x > self.max {
            self.max = x;
        }

        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(x);
        self.dirty = true;
    }

    fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    fn ensure_sorted(&mut self) {
        if self.dirty {
            self.sorted.clear();
            self.sorted.extend(self.window.iter().copied());
            self.sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            self.dirty = false;
        }
    }

    fn percentile(&mut self, p: f64) -> f64 {
        self.ensure_sorted();
        if self.sorted.is_empty() {
            return 0.0;
        }
        if self.sorted.len() == 1 {
            return self.sorted[0];
        }
        let p = p.clamp(0.0, 100.0) / 100.0;
        let rank = p * (self.sorted.len() - 1) as f64;
        let lo = rank.floor() as usize;
        let hi = rank.ceil() as usize;
        if lo == hi {
            self.sorted[lo]
        } else {
            let frac = rank - lo as f64;
            self.sorted[lo] + (self.sorted[hi] - self.sorted[lo]) * frac
        }
    }

    fn reset(&mut self) {
        self.count = 0;
        self.mean = 0.0;
        self.m2 = 0.0;
        self.min = f64::INFINITY;
        self.max = f64::NEG_INFINITY;
        self.window.clear();
        self.sorted.clear();
        self.dirty = false;
    }

    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            count: self.count,
            mean: self.mean,
            stddev: self.variance().sqrt(),
            min: if self.count == 0 { 0.0 } else { self.min },
            max: if self.count == 0 { 0.0 } else { self.max },
        }
    }

    /// Resize the retention window without losing the most-recent samples.
    fn resize(&mut self, new_capacity: usize) {
        let new_capacity = new_capacity.max(1);
        self.capacity = new_capacity;
        while self.window.len() > new_capacity {
            self.window.pop_front();
        }
        self.dirty = true;
    }
}

/// Thread-safe streaming stats collector. A single lock protects the
/// sample buffer; `count`/`mean`/`min`/`max` live behind the same lock so
/// `snapshot()` is always coherent (no torn reads across fields).
pub struct StreamingStats {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for StreamingStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snap = self.snapshot();
        f.debug_struct("StreamingStats").field("snapshot", &snap).finish()
    }
}

impl StreamingStats {
    /// Create a tracker retaining at most `capacity` most-recent samples
    /// for percentile estimation. `count`/`mean`/`stddev`/`min`/`max` are
    /// computed over the full history, not just the retained window.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::new(capacity)),
        }
    }

    /// Record one observation.
    pub fn record(&self, x: f64) {
        self.inner.lock().unwrap().record(x);
    }

    /// Linear-interpolated percentile (`p` in `[0, 100]`) over the
    /// retained window. `percentile(0)` is the window min,
    /// `percentile(100)` the window max.
    pub fn percentile(&self, p: f64) -> f64 {
        self.inner.lock().unwrap().percentile(p)
    }

    /// Clear all state.
    pub fn reset(&self) {
        self.inner.lock().unwrap().reset();
    }

    /// Coherent snapshot of count/mean/stddev/min/max.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        self.inner.lock().unwrap().snapshot()
    }

    /// Resize the percentile retention window, keeping the most recent
    /// samples.
    pub fn resize(&self, new_capacity: usize) {
        self.inner.lock().unwrap().resize(new_capacity);
    }

    /// Number of samples currently retained for percentile estimation
    /// (bounded by capacity, distinct from the all-time `count`).
    #[must_use]
    pub fn retained_len(&self) -> usize {
        self.inner.lock().unwrap().window.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welford_matches_known_sample() {
        // [2,4,4,4,5,5,7,9] -> mean=5, sample variance=4, stddev=2.
        let stats = StreamingStats::new(100);
        for x in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            stats.record(x);
        }
        let snap = stats.snapshot();
        assert!((snap.mean - 5.0).abs() < 1e-9);
        assert!((snap.stddev - 2.0).abs() < 1e-9);
        assert_eq!(snap.min, 2.0);
        assert_eq!(snap.max, 9.0);
        assert_eq!(snap.count, 8);
    }

    #[test]
    fn constant_series_percentile_equals_constant() {
        let stats = StreamingStats::new(50);
        for _ in 0..50 {
            stats.record(7.0);
        }
        assert_eq!(stats.percentile(50.0), 7.0);
        assert_eq!(stats.percentile(99.0), 7.0);
        assert_eq!(stats.percentile(0.0), 7.0);
    }

    #[test]
    fn empty_series_has_zero_percentile_and_no_nan() {
        let stats = StreamingStats::new(10);
        assert_eq!(stats.percentile(50.0), 0.0);
        let snap = stats.snapshot();
        assert_eq!(snap.stddev, 0.0);
        assert_eq!(snap.mean, 0.0);
        assert!(!snap.mean.is_nan());
    }

    #[test]
    fn percentiles_non_decreasing() {
        let stats = StreamingStats::new(1000);
        for i in 0..1000 {
            stats.record(i as f64);
        }
        let p50 = stats.percentile(50.0);
        let p95 = stats.percentile(95.0);
        let p99 = stats.percentile(99.0);
        assert!(p50 <= p95);
        assert!(p95 <= p99);
    }

    #[test]
    fn fifo_eviction_bounds_window() {
        let stats = StreamingStats::new(10);
        for i in 0..1000 {
            stats.record(i as f64);
        }
        assert_eq!(stats.retained_len(), 10);
        // All-time count still reflects every sample.
        assert_eq!(stats.snapshot().count, 1000);
        // Percentile window only spans the most recent 10 values [990..999].
        assert!(stats.percentile(0.0) >= 990.0);
    }

    #[test]
    fn reset_clears_all_state() {
        let stats = StreamingStats::new(10);
        for i in 0..20 {
            stats.record(i as f64);
        }
        stats.reset();
        let snap = stats.snapshot();
        assert_eq!(snap.count, 0);
        assert_eq!(stats.percentile(50.0), 0.0);
    }

    #[test]
    fn resize_keeps_most_recent_samples() {
        let stats = StreamingStats::new(100);
        for i in 0..100 {
            stats.record(i as f64);
        }
        stats.resize(10);
        assert_eq!(stats.retained_len(), 10);
        assert!(stats.percentile(0.0) >= 90.0);
    }
}
