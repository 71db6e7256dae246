//! Core data model: `RunConfig`, `BandSpec`, `Job`, and the result types
//! produced by a run. Mirrors the entities in the engine's data-model
//! design, including their invariants and ownership rules.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analyzer::Analysis;

/// Closed set of progressive scaling strategies. A tagged variant rather
/// than a trait: the set of strategies is fixed at build time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalingStrategy {
    Linear,
    Exponential,
    Fibonacci,
    /// Explicit per-band step arrays; `workers` and `connections` must have
    /// equal length and be strictly non-decreasing.
    Custom {
        workers: Vec<usize>,
        connections: Vec<usize>,
    },
}

/// A closed range `[min, max]`, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: usize,
    pub max: usize,
}

impl Range {
    #[must_use]
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.min >= 1 && self.min <= self.max
    }

    #[must_use]
    pub fn is_point(&self) -> bool {
        self.min == self.max
    }
}

/// Memory caps and sample-retention limits for a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MemoryCaps {
    pub max_latency_samples: usize,
    pub max_tps_samples: usize,
    pub mem_limit_mb: usize,
}

impl Default for MemoryCaps {
    fn default() -> Self {
        Self {
            max_latency_samples: 10_000,
            max_tps_samples: 1_000,
            mem_limit_mb: 512,
        }
    }
}

impl MemoryCaps {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.max_latency_samples > 0 && self.max_tps_samples > 0 && self.mem_limit_mb > 0
    }
}

/// Circuit breaker thresholds, shared by every breaker instance created
/// during a run unless a caller supplies a per-name override.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub max_failures: u32,
    pub reset_timeout: Duration,
    pub half_open_limit: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_limit: 2,
        }
    }
}

/// Adaptive-scaling flags shared by the backpressure controller and the
/// worker pool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    pub enabled: bool,
    pub pressure_threshold: f64,
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,
    pub adjustment_delay: Duration,
    pub adjustment_interval: Duration,
    pub target_utilization: f64,
    pub max_concurrency: usize,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pressure_threshold: 0.8,
            scale_up_threshold: 0.75,
            scale_down_threshold: 0.3,
            adjustment_delay: Duration::from_secs(5),
            adjustment_interval: Duration::from_secs(5),
            target_utilization: 0.7,
            max_concurrency: 1024,
        }
    }
}

/// Immutable input describing an entire progressive run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub workload_name: String,
    pub target_duration: Duration,
    pub strategy: ScalingStrategy,
    pub workers: Range,
    pub connections: Range,
    pub bands: usize,
    pub band_duration: Duration,
    pub warmup: Duration,
    pub cooldown: Duration,
    pub memory: MemoryCaps,
    pub priority_queue_capacity: usize,
    pub breaker: CircuitBreakerConfig,
    pub adaptive: AdaptiveConfig,
}

impl RunConfig {
    /// Validate the invariants in the data-model design. Returns the first
    /// violation found, as a human-readable message (wrapped by the caller
    /// into `StormError::ConfigInvalid`).
    pub fn validate(&self) -> Result<(), String> {
        if self.workload_name.trim().is_empty() {
            return Err("workload_name must not be empty".into());
        }
        if !self.workers.is_valid() {
            return Err(format!(
                "worker range invalid: min={} max={}",
                self.workers.min, self.workers.max
            ));
        }
        if !self.connections.is_valid() {
            return Err(format!(
                "connection range invalid: min={} max={}",
                self.connections.min, self.connections.max
            ));
        }
        if self.band_duration.is_zero() {
            return Err("band_duration must be > 0".into());
        }
        if !self.memory.is_valid() {
            return Err("memory caps must be strictly positive".into());
        }
        if self.priority_queue_capacity == 0 {
            return Err("priority_queue_capacity must be > 0".into());
        }
        let spans_multiple = self.workers.max > self.workers.min || self.connections.max > self.connections.min;
        if spans_multiple && self.bands < 2 {
            return Err("bands must be >= 2 when a range spans more than one value".into());
        }
        if let ScalingStrategy::Custom { workers, connections } = &self.strategy {
            if workers.len() != connections.len() {
                return Err("custom strategy arrays must have equal length".into());
            }
            if workers.is_empty() {
                return Err("custom strategy arrays must not be empty".into());
            }
            if !is_non_decreasing(workers) || !is_non_decreasing(connections) {
                return Err("custom strategy arrays must be strictly non-decreasing".into());
            }
        }
        Ok(())
    }
}

fn is_non_decreasing(xs: &[usize]) -> bool {
    xs.windows(2).all(|w| w[1] >= w[0])
}

/// One planned operating point within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandSpec {
    /// 1-based, dense, unique within a run.
    pub band_id: u32,
    pub workers: usize,
    pub connections: usize,
    pub warmup: Duration,
    pub measure: Duration,
    pub cooldown: Duration,
}

/// Job priority. Strict ordering: `High` drains before `Normal` before
/// `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low = 0,
    Normal = 1,
    High = 2,
}

/// Identifies one band's performance numbers, computed from the measure
/// phase only.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Performance {
    pub tps: f64,
    pub qps: f64,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub error_count: u64,
    pub error_rate: f64,
}

/// Per-resource efficiency figures.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Efficiency {
    pub tps_per_worker: f64,
    pub tps_per_connection: f64,
    pub marginal_gain: f64,
    pub marginal_cost: f64,
    pub roi: f64,
}

/// Variability / confidence-interval figures computed from the TPS ring
/// buffer and latency samples.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Stability {
    pub tps_stddev: f64,
    pub latency_stddev: f64,
    pub coefficient_of_variation: f64,
    pub tps_ci_low: f64,
    pub tps_ci_high: f64,
    pub drift: f64,
}

/// Resource-utilization snapshot captured at `stop_collection`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Resources {
    pub connection_utilization: f64,
    pub worker_utilization: f64,
    pub mem_mb: f64,
    pub cpu_utilization: Option<f64>,
}

/// Immutable output of one band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandResult {
    pub band_id: u32,
    pub workers: usize,
    pub connections: usize,
    pub measured_duration: Duration,
    pub performance: Performance,
    pub efficiency: Efficiency,
    pub stability: Stability,
    pub resources: Resources,
    /// Set when the band's measure phase returned a `RunFailed` error; the
    /// band's counters are still populated from whatever was observed
    /// before the failure.
    pub failed: bool,
}

impl BandResult {
    /// `successful_tx` derived from `performance` — the authoritative
    /// figure for TPS computation (`TPS = successful_tx / measured_seconds`).
    #[must_use]
    pub fn successful_transactions(&self) -> u64 {
        let seconds = self.measured_duration.as_secs_f64();
        if seconds <= 0.0 {
            0
        } else {
            (self.performance.tps * seconds).round() as u64
        }
    }
}

/// Ordered sequence of band results plus the analyzer's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressiveResult {
    pub bands: Vec<BandResult>,
    pub analysis: Analysis,
    pub optimal_band: Option<u32>,
    pub total_capacity: f64,
    pub scaling_efficiency: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> RunConfig {
        RunConfig {
            workload_name: "tpcc".into(),
            target_duration: Duration::from_secs(300),
            strategy: ScalingStrategy::Linear,
            workers: Range::new(2, 10),
            connections: Range::new(2, 10),
            bands: 5,
            band_duration: Duration::from_secs(30),
            warmup: Duration::from_secs(5),
            cooldown: Duration::from_secs(5),
            memory: MemoryCaps::default(),
            priority_queue_capacity: 1024,
            breaker: CircuitBreakerConfig::default(),
            adaptive: AdaptiveConfig::default(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_range() {
        let mut cfg = base_config();
        cfg.workers = Range::new(10, 2);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_band_duration() {
        let mut cfg = base_config();
        cfg.band_duration = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_single_band_with_spanning_range() {
        let mut cfg = base_config();
        cfg.bands = 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn accepts_single_band_with_point_range() {
        let mut cfg = base_config();
        cfg.workers = Range::new(4, 4);
        cfg.connections = Range::new(4, 4);
        cfg.bands = 1;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_mismatched_custom_arrays() {
        let mut cfg = base_config();
        cfg.strategy = ScalingStrategy::Custom {
            workers: vec![1, 2, 3],
            connections: vec![1, 2],
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_non_monotonic_custom_arrays() {
        let mut cfg = base_config();
        cfg.strategy = ScalingStrategy::Custom {
            workers: vec![1, 5, 3],
            connections: vec![1, 2, 3],
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn priority_orders_high_above_low() {
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }
}
