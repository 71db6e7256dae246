//! Streaming metrics collector (C5): the per-band bounded-memory collector
//! that plugins report into and the band runner drains into a
//! [`BandResult`].
//!
//! Generalizes the teacher's one-shot `calculate_operational_result` into a
//! standing, per-band collector: the same percentile/TPS math, but backed
//! by [`StreamingStats`] (C1) and a ring buffer instead of a post-hoc sort
//! over every collected `QueryMetric`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::env::Clock;
use crate::plugin::MetricsRecorder;
use crate::stats::StreamingStats;
use crate::types::{BandResult, Efficiency, Performance, Resources, Stability};

/// One point in the TPS ring buffer: cumulative transaction count observed
/// at a point in time, used to derive both TPS and its variance.
#[derive(Debug, Clone, Copy)]
pub struct TpsPoint {
    pub at: Instant,
    pub cumulative_tx: u64,
}

/// A coherent, non-torn view of live collector state, broadcast to
/// listeners on every transaction.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub tps: f64,
    pub qps: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub error_rate: f64,
    pub active_workers: usize,
}

struct RingBuffer {
    points: std::collections::VecDeque<TpsPoint>,
    capacity: usize,
}

impl RingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            points: std::collections::VecDeque::with_capacity(capacity.min(4096)),
            capacity: capacity.max(1),
        }
    }

    fn push(&mut self, point: TpsPoint) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    fn resize(&mut self, new_capacity: usize) {
        self.capacity = new_capacity.max(1);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    /// Standard deviation of instantaneous TPS derived from consecutive
    /// ring-buffer points.
    fn tps_stddev(&self) -> f64 {
        if self.points.len() < 2 {
            return 0.0;
        }
        let ordered: Vec<&TpsPoint> = self.points.iter().collect();
        let mut rates = Vec::with_capacity(ordered.len().saturating_sub(1));
        for w in ordered.windows(2) {
            let dt = w[1].at.saturating_duration_since(w[0].at).as_secs_f64();
            if dt > 0.0 {
                let dtx = w[1].cumulative_tx.saturating_sub(w[0].cumulative_tx) as f64;
                rates.push(dtx / dt);
            }
        }
        if rates.len() < 2 {
            return 0.0;
        }
        let mean = rates.iter().sum::<f64>() / rates.len() as f64;
        let var = rates.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (rates.len() - 1) as f64;
        var.sqrt()
    }

    fn len(&self) -> usize {
        self.points.len()
    }
}

/// Per-band bounded-memory collector. One instance is active per band.
pub struct StreamingMetricsCollector {
    clock: std::sync::Arc<dyn Clock>,
    band_id: AtomicU64,
    active: AtomicBool,
    start: Mutex<Option<Instant>>,
    expected_duration: Mutex<Duration>,
    total_tx: AtomicU64,
    succ: AtomicU64,
    err: AtomicU64,
    queries: AtomicU64,
    rows: AtomicU64,
    active_workers: AtomicI64,
    latency: StreamingStats,
    ring: Mutex<RingBuffer>,
    query_types: Mutex<HashMap<String, u64>>,
    error_types: Mutex<HashMap<String, u64>>,
    custom: Mutex<HashMap<String, f64>>,
    listeners: broadcast::Sender<MetricsSnapshot>,
}

impl StreamingMetricsCollector {
    #[must_use]
    pub fn new(max_latency_samples: usize, max_tps_samples: usize, clock: std::sync::Arc<dyn Clock>) -> Self {
        let (tx, _rx) = broadcast::channel(64);
        Self {
            clock,
            band_id: AtomicU64::new(0),
            active: AtomicBool::new(false),
            start: Mutex::new(None),
            expected_duration: Mutex::new(Duration::ZERO),
            total_tx: AtomicU64::new(0),
            succ: AtomicU64::new(0),
            err: AtomicU64::new(0),
            queries: AtomicU64::new(0),
            rows: AtomicU64::new(0),
            active_workers: AtomicI64::new(0),
            latency: StreamingStats::new(max_latency_samples),
            ring: Mutex::new(RingBuffer::new(max_tps_samples.min(1000))),
            query_types: Mutex::new(HashMap::new()),
            error_types: Mutex::new(HashMap::new()),
            custom: Mutex::new(HashMap::new()),
            listeners: tx,
        }
    }

    /// Subscribe to best-effort, fire-and-forget snapshot notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MetricsSnapshot> {
        self.listeners.subscribe()
    }

    /// Reset all state and mark the collector active for `band_id`.
    pub fn start_collection(&self, band_id: u32, expected_duration: Duration) {
        self.band_id.store(u64::from(band_id), Ordering::Relaxed);
        self.total_tx.store(0, Ordering::Relaxed);
        self.succ.store(0, Ordering::Relaxed);
        self.err.store(0, Ordering::Relaxed);
        self.queries.store(0, Ordering::Relaxed);
        self.rows.store(0, Ordering::Relaxed);
        self.latency.reset();
        {
            let mut ring = self.ring.lock().unwrap();
            let capacity = ring.capacity;
            *ring = RingBuffer::new(capacity);
        }
        self.query_types.lock().unwrap().clear();
        self.error_types.lock().unwrap().clear();
        self.custom.lock().unwrap().clear();
        *self.start.lock().unwrap() = Some(self.clock.now());
        *self.expected_duration.lock().unwrap() = expected_duration;
        self.active.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Record one transaction outcome. Notifications to listeners are
    /// best-effort and never block the caller.
    pub fn record_transaction(&self, success: bool, latency_ns: i64) {
        if !self.is_active() {
            return;
        }
        let total = self.total_tx.fetch_add(1, Ordering::Relaxed) + 1;
        if success {
            self.succ.fetch_add(1, Ordering::Relaxed);
        } else {
            self.err.fetch_add(1, Ordering::Relaxed);
        }
        let latency_ms = (latency_ns as f64) / 1_000_000.0;
        self.latency.record(latency_ms);
        self.ring.lock().unwrap().push(TpsPoint {
            at: self.clock.now(),
            cumulative_tx: total,
        });

        // Fire-and-forget: a broadcast send fails only when there are no
        // receivers, which is the common case and not an error.
        let _ = self.listeners.send(self.snapshot());
    }

    pub fn record_query(&self, query_type: &str, rows_affected: i64) {
        if !self.is_active() {
            return;
        }
        self.queries.fetch_add(1, Ordering::Relaxed);
        if rows_affected > 0 {
            self.rows.fetch_add(rows_affected as u64, Ordering::Relaxed);
        }
        *self.query_types.lock().unwrap().entry(query_type.to_string()).or_insert(0) += 1;
    }

    pub fn record_error(&self, err_kind: &str) {
        if !self.is_active() {
            return;
        }
        *self.error_types.lock().unwrap().entry(err_kind.to_string()).or_insert(0) += 1;
    }

    pub fn record_custom_metric(&self, name: &str, value: f64) {
        if !self.is_active() {
            return;
        }
        self.custom.lock().unwrap().insert(name.to_string(), value);
    }

    pub fn set_active_workers(&self, n: usize) {
        self.active_workers.store(n as i64, Ordering::Relaxed);
    }

    fn elapsed_seconds(&self) -> f64 {
        match *self.start.lock().unwrap() {
            Some(start) => self.clock.now().saturating_duration_since(start).as_secs_f64(),
            None => 0.0,
        }
    }

    /// `total_tx / elapsed_seconds`, `0` if inactive or not yet started.
    #[must_use]
    pub fn current_tps(&self) -> f64 {
        if !self.is_active() {
            return 0.0;
        }
        let secs = self.elapsed_seconds();
        if secs <= 0.0 {
            0.0
        } else {
            self.total_tx.load(Ordering::Relaxed) as f64 / secs
        }
    }

    #[must_use]
    pub fn current_latency_p95(&self) -> f64 {
        self.latency.percentile(95.0)
    }

    #[must_use]
    pub fn current_error_rate(&self) -> f64 {
        let total = self.total_tx.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            self.err.load(Ordering::Relaxed) as f64 / total as f64
        }
    }

    /// Synthesize a coherent snapshot for listeners.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let secs = self.elapsed_seconds();
        let queries = self.queries.load(Ordering::Relaxed);
        MetricsSnapshot {
            tps: self.current_tps(),
            qps: if secs > 0.0 { queries as f64 / secs } else { 0.0 },
            p50_latency_ms: self.latency.percentile(50.0),
            p95_latency_ms: self.latency.percentile(95.0),
            p99_latency_ms: self.latency.percentile(99.0),
            error_rate: self.current_error_rate(),
            active_workers: self.active_workers.load(Ordering::Relaxed).max(0) as usize,
        }
    }

    /// Resize the latency and TPS sample caps without losing the
    /// most-recent window.
    pub fn set_memory_limits(&self, max_latency_samples: usize, max_tps_samples: usize) {
        self.latency.resize(max_latency_samples);
        self.ring.lock().unwrap().resize(max_tps_samples.min(1000));
    }

    /// Freeze state and compute the band's final `BandResult`.
    pub fn stop_collection(&self, workers: usize, connections: usize, worker_limit: usize, conn_limit: usize) -> BandResult {
        self.active.store(false, Ordering::SeqCst);
        let band_id = self.band_id.load(Ordering::Relaxed) as u32;
        let secs = self.elapsed_seconds().max(0.0);
        let total = self.total_tx.load(Ordering::Relaxed);
        let succ = self.succ.load(Ordering::Relaxed);
        let err = self.err.load(Ordering::Relaxed);
        let queries = self.queries.load(Ordering::Relaxed);

        let snap = self.latency.snapshot();
        let tps = if secs > 0.0 { succ as f64 / secs } else { 0.0 };
        let qps = if secs > 0.0 { queries as f64 / secs } else { 0.0 };
        let error_rate = if total > 0 { err as f64 / total as f64 } else { 0.0 };

        let performance = Performance {
            tps,
            qps,
            avg_latency_ms: snap.mean,
            p50_latency_ms: self.latency.percentile(50.0),
            p95_latency_ms: self.latency.percentile(95.0),
            p99_latency_ms: self.latency.percentile(99.0),
            error_count: err,
            error_rate,
        };

        let efficiency = Efficiency {
            tps_per_worker: if workers > 0 { tps / workers as f64 } else { 0.0 },
            tps_per_connection: if connections > 0 { tps / connections as f64 } else { 0.0 },
            marginal_gain: 0.0,
            marginal_cost: 0.0,
            roi: 0.0,
        };

        let ring = self.ring.lock().unwrap();
        let stability = Stability {
            tps_stddev: ring.tps_stddev(),
            latency_stddev: snap.stddev,
            coefficient_of_variation: if tps > 0.0 { ring.tps_stddev() / tps } else { 0.0 },
            tps_ci_low: tps - 1.96 * ring.tps_stddev() / (ring.len().max(1) as f64).sqrt(),
            tps_ci_high: tps + 1.96 * ring.tps_stddev() / (ring.len().max(1) as f64).sqrt(),
            drift: 0.0,
        };
        drop(ring);

        let resources = Resources {
            connection_utilization: if conn_limit > 0 { connections as f64 / conn_limit as f64 } else { 0.0 },
            worker_utilization: if worker_limit > 0 { workers as f64 / worker_limit as f64 } else { 0.0 },
            mem_mb: 0.0,
            cpu_utilization: None,
        };

        BandResult {
            band_id,
            workers,
            connections,
            measured_duration: Duration::from_secs_f64(secs),
            performance,
            efficiency,
            stability,
            resources,
            failed: false,
        }
    }
}

/// Lets plugins report through the collector without seeing its admin
/// methods (`start_collection`, `stop_collection`, `snapshot`).
impl MetricsRecorder for StreamingMetricsCollector {
    fn record_transaction(&self, success: bool, latency_ns: i64) {
        StreamingMetricsCollector::record_transaction(self, success, latency_ns);
    }

    fn record_query(&self, kind: &str, rows_affected: i64) {
        StreamingMetricsCollector::record_query(self, kind, rows_affected);
    }

    fn record_error(&self, err: &str) {
        StreamingMetricsCollector::record_error(self, err);
    }

    fn record_custom_metric(&self, name: &str, value: f64) {
        StreamingMetricsCollector::record_custom_metric(self, name, value);
    }

    fn current_tps(&self) -> f64 {
        StreamingMetricsCollector::current_tps(self)
    }

    fn current_latency_p95(&self) -> f64 {
        StreamingMetricsCollector::current_latency_p95(self)
    }

    fn current_error_rate(&self) -> f64 {
        StreamingMetricsCollector::current_error_rate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::SystemClock;
    use std::sync::Arc;

    fn collector() -> StreamingMetricsCollector {
        StreamingMetricsCollector::new(1000, 1000, Arc::new(SystemClock))
    }

    #[test]
    fn inactive_collector_ignores_records() {
        let c = collector();
        c.record_transaction(true, 1_000_000);
        assert_eq!(c.current_tps(), 0.0);
    }

    #[tokio::test]
    async fn records_during_active_window() {
        let c = collector();
        c.start_collection(1, Duration::from_secs(1));
        for _ in 0..10 {
            c.record_transaction(true, 5_000_000);
        }
        c.record_transaction(false, 5_000_000);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let result = c.stop_collection(4, 4, 4, 4);
        assert_eq!(result.band_id, 1);
        assert_eq!(result.performance.error_count, 1);
        assert!(result.performance.p50_latency_ms <= result.performance.p95_latency_ms);
        assert!(result.performance.p95_latency_ms <= result.performance.p99_latency_ms);
    }

    #[test]
    fn empty_band_has_zero_percentiles_no_nan() {
        let c = collector();
        c.start_collection(1, Duration::from_secs(1));
        let result = c.stop_collection(1, 1, 1, 1);
        assert_eq!(result.performance.p50_latency_ms, 0.0);
        assert!(!result.performance.tps.is_nan());
    }

    #[test]
    fn memory_limits_resize_without_panicking() {
        let c = collector();
        c.start_collection(1, Duration::from_secs(1));
        for i in 0..100 {
            c.record_transaction(true, i * 1000);
        }
        c.set_memory_limits(10, 10);
        // Must not panic and must still answer queries.
        let _ = c.current_latency_p95();
    }
}
