//! Backpressure controller (C3): bounds active workers/connections/queue
//! depth and computes a pressure scalar used for admission and
//! auto-scaling.
//!
//! Grounded on `other_examples/.../backpressure.rs`'s `HealthLevel`
//! threshold-table pattern: this controller computes a continuous
//! `pressure` in `[0, 1]` the way that file computes discrete
//! Green/Yellow/Red signals, and exposes the same kind of coarse
//! [`PressureLevel`] convenience classification for callers that don't
//! need the raw float.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::info;

use crate::error::StormError;
use crate::types::AdaptiveConfig;

/// Coarse read of the current pressure scalar, mirroring the pack's
/// Green/Yellow/Red idiom for backpressure signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureLevel {
    Green,
    Yellow,
    Red,
}

impl PressureLevel {
    #[must_use]
    pub fn from_pressure(pressure: f64) -> Self {
        if pressure >= 0.8 {
            PressureLevel::Red
        } else if pressure >= 0.5 {
            PressureLevel::Yellow
        } else {
            PressureLevel::Green
        }
    }
}

/// One auto-scaling decision, emitted every time a limit changes.
#[derive(Debug, Clone, Copy)]
pub struct ScalingEvent {
    pub resource: Resource,
    pub old_limit: usize,
    pub new_limit: usize,
    pub pressure: f64,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Connections,
    Workers,
    Queue,
}

/// Observer callback for scaling events. Invoked synchronously from
/// `consider_scaling`; implementations must not block.
pub trait ScalingObserver: Send + Sync {
    fn on_scaling_event(&self, event: ScalingEvent);
}

struct Limits {
    connections: usize,
    workers: usize,
    queue: usize,
    floor_connections: usize,
    floor_workers: usize,
    floor_queue: usize,
}

/// Tracks active connections/workers/queued-requests and the observed
/// latency EWMA, computing the combined pressure scalar.
pub struct BackpressureController {
    active_connections: AtomicI64,
    active_workers: AtomicI64,
    queued_requests: AtomicI64,
    dropped: AtomicU64,
    latency_ewma_us: AtomicU64,
    limits: Mutex<Limits>,
    adaptive: AdaptiveConfig,
    last_adjustment: Mutex<Instant>,
    observer: Option<Box<dyn ScalingObserver>>,
}

impl BackpressureController {
    #[must_use]
    pub fn new(connections: usize, workers: usize, queue: usize, adaptive: AdaptiveConfig) -> Self {
        Self {
            active_connections: AtomicI64::new(0),
            active_workers: AtomicI64::new(0),
            queued_requests: AtomicI64::new(0),
            dropped: AtomicU64::new(0),
            latency_ewma_us: AtomicU64::new(0),
            limits: Mutex::new(Limits {
                connections,
                workers,
                queue,
                floor_connections: 1,
                floor_workers: 1,
                floor_queue: 1,
            }),
            adaptive,
            last_adjustment: Mutex::new(Instant::now()),
            observer: None,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Box<dyn ScalingObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    fn util(current: i64, limit: usize) -> f64 {
        if limit == 0 {
            return 1.0;
        }
        (current as f64 / limit as f64).clamp(0.0, 1.0)
    }

    /// Compute `pressure = 0.3*conn_util + 0.2*worker_util + 0.3*queue_util + 0.2*latency_util`.
    #[must_use]
    pub fn pressure(&self) -> f64 {
        let limits = self.limits.lock().unwrap();
        let conn_util = Self::util(self.active_connections.load(Ordering::Relaxed), limits.connections);
        let worker_util = Self::util(self.active_workers.load(Ordering::Relaxed), limits.workers);
        let queue_util = Self::util(self.queued_requests.load(Ordering::Relaxed), limits.queue);
        let latency_util = (self.latency_ewma_us.load(Ordering::Relaxed) as f64 / 100_000.0).clamp(0.0, 1.0);
        0.3 * conn_util + 0.2 * worker_util + 0.3 * queue_util + 0.2 * latency_util
    }

    #[must_use]
    pub fn pressure_level(&self) -> PressureLevel {
        PressureLevel::from_pressure(self.pressure())
    }

    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn try_acquire(&self, counter: &AtomicI64, limit: usize, threshold: f64) -> Result<(), StormError> {
        let current = counter.load(Ordering::Relaxed);
        if current as usize >= limit {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(StormError::AcquireRejected("limit reached".into()));
        }
        if self.pressure() > threshold {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(StormError::AcquireRejected("pressure threshold exceeded".into()));
        }
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn acquire_connection(&self) -> Result<(), StormError> {
        let limit = self.limits.lock().unwrap().connections;
        self.try_acquire(&self.active_connections, limit, self.adaptive.pressure_threshold)
    }

    pub fn release_connection(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed).max(0);
        self.clamp_non_negative(&self.active_connections);
    }

    pub fn acquire_worker(&self) -> Result<(), StormError> {
        let limit = self.limits.lock().unwrap().workers;
        self.try_acquire(&self.active_workers, limit, self.adaptive.pressure_threshold)
    }

    pub fn release_worker(&self) {
        self.active_workers.fetch_sub(1, Ordering::Relaxed);
        self.clamp_non_negative(&self.active_workers);
    }

    pub fn enqueue_request(&self) -> Result<(), StormError> {
        let limit = self.limits.lock().unwrap().queue;
        self.try_acquire(&self.queued_requests, limit, self.adaptive.pressure_threshold)
    }

    pub fn release_request(&self) {
        self.queued_requests.fetch_sub(1, Ordering::Relaxed);
        self.clamp_non_negative(&self.queued_requests);
    }

    fn clamp_non_negative(&self, counter: &AtomicI64) {
        let v = counter.load(Ordering::Relaxed);
        if v < 0 {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Feed an observed latency (used by an EWMA with weight 1/2) and
    /// trigger `consider_scaling` if adaptive scaling is enabled.
    pub fn update_latency(&self, observed: Duration) {
        let us = observed.as_micros() as u64;
        let prev = self.latency_ewma_us.load(Ordering::Relaxed);
        let next = if prev == 0 { us } else { (prev + us) / 2 };
        self.latency_ewma_us.store(next, Ordering::Relaxed);
        if self.adaptive.enabled {
            self.consider_scaling();
        }
    }

    /// Auto-scale the connection/worker/queue caps based on current
    /// utilization and pressure, gated by `adjustment_delay`.
    pub fn consider_scaling(&self) {
        if !self.adaptive.enabled {
            return;
        }
        {
            let mut last = self.last_adjustment.lock().unwrap();
            if last.elapsed() < self.adaptive.adjustment_delay {
                return;
            }
            *last = Instant::now();
        }

        let pressure = self.pressure();
        let mut limits = self.limits.lock().unwrap();

        let floor_connections = limits.floor_connections;
        let floor_workers = limits.floor_workers;
        let floor_queue = limits.floor_queue;
        let Limits { connections, workers, queue, .. } = &mut *limits;
        let resources: [(Resource, &AtomicI64, &mut usize, usize); 3] = [
            (Resource::Connections, &self.active_connections, connections, floor_connections),
            (Resource::Workers, &self.active_workers, workers, floor_workers),
            (Resource::Queue, &self.queued_requests, queue, floor_queue),
        ];

        for (resource, counter, limit, floor) in resources {
            let util = Self::util(counter.load(Ordering::Relaxed), *limit);
            let old_limit = *limit;
            if pressure > self.adaptive.scale_up_threshold && util > 0.8 {
                *limit = ((*limit as f64) * 1.2).ceil() as usize;
            } else if pressure < self.adaptive.scale_down_threshold && util < 0.3 && *limit > floor {
                *limit = (((*limit as f64) * 0.8).floor() as usize).max(floor);
            }
            if *limit != old_limit {
                let event = ScalingEvent {
                    resource,
                    old_limit,
                    new_limit: *limit,
                    pressure,
                };
                info!(?resource, old_limit, new_limit = *limit, pressure, "backpressure auto-scale");
                if let Some(observer) = &self.observer {
                    observer.on_scaling_event(event);
                }
            }
        }
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Resource::Connections => "connections",
            Resource::Workers => "workers",
            Resource::Queue => "queue",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adaptive_disabled() -> AdaptiveConfig {
        AdaptiveConfig {
            enabled: false,
            ..AdaptiveConfig::default()
        }
    }

    #[test]
    fn acquire_succeeds_under_limit() {
        let c = BackpressureController::new(10, 10, 10, adaptive_disabled());
        for _ in 0..10 {
            assert!(c.acquire_connection().is_ok());
        }
        assert!(c.acquire_connection().is_err());
        assert_eq!(c.dropped(), 1);
    }

    #[test]
    fn pressure_drop_scenario_from_spec() {
        // limit=10, 9 active connections; craft latency/queue so pressure
        // crosses 0.8 before the 10th acquire.
        let cfg = AdaptiveConfig {
            pressure_threshold: 0.8,
            ..adaptive_disabled()
        };
        let c = BackpressureController::new(10, 10, 10, cfg);
        for _ in 0..9 {
            c.acquire_connection().unwrap();
        }
        // Push queue and latency util high enough that combined pressure > 0.8.
        for _ in 0..10 {
            c.enqueue_request().unwrap();
        }
        c.update_latency(Duration::from_millis(100));
        assert!(c.pressure() > 0.8);
        assert!(c.acquire_connection().is_err());
        assert_eq!(c.dropped(), 1);
    }

    #[test]
    fn release_decrements_and_never_goes_negative() {
        let c = BackpressureController::new(5, 5, 5, adaptive_disabled());
        c.release_connection();
        c.release_connection();
        assert_eq!(c.active_connections.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn scale_up_when_pressure_and_utilization_high() {
        let cfg = AdaptiveConfig {
            enabled: true,
            adjustment_delay: Duration::ZERO,
            scale_up_threshold: 0.5,
            ..AdaptiveConfig::default()
        };
        let c = BackpressureController::new(10, 10, 10, cfg);
        for _ in 0..9 {
            c.acquire_connection().unwrap();
            c.acquire_worker().unwrap();
            c.enqueue_request().unwrap();
        }
        c.update_latency(Duration::from_millis(100));
        assert!(c.pressure() > 0.5);
        let before = c.limits.lock().unwrap().connections;
        c.consider_scaling();
        let after = c.limits.lock().unwrap().connections;
        assert!(after > before);
    }

    #[test]
    fn scale_down_when_pressure_and_utilization_low() {
        let cfg = AdaptiveConfig {
            enabled: true,
            adjustment_delay: Duration::ZERO,
            scale_down_threshold: 0.9,
            ..AdaptiveConfig::default()
        };
        let c = BackpressureController::new(100, 100, 100, cfg);
        c.acquire_connection().unwrap();
        c.consider_scaling();
        let after = c.limits.lock().unwrap().connections;
        assert!(after <= 100);
        assert!(after >= 1);
    }

    #[test]
    fn pressure_level_buckets() {
        assert_eq!(PressureLevel::from_pressure(0.1), PressureLevel::Green);
        assert_eq!(PressureLevel::from_pressure(0.6), PressureLevel::Yellow);
        assert_eq!(PressureLevel::from_pressure(0.9), PressureLevel::Red);
    }
}
