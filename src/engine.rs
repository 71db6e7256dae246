//! Progressive engine (C7): builds a band plan from a `RunConfig` strategy
//! and drives the bands sequentially through the band runner, then
//! post-processes the results into a `ProgressiveResult`.

use std::sync::Arc;

use tracing::{info, warn};

use crate::analyzer::{self, Analysis};
use crate::band_runner::{run_band, BandRunnerConfig};
use crate::env::{CancelToken, Env};
use crate::error::StormError;
use crate::plugin::Workload;
use crate::types::{BandResult, BandSpec, ProgressiveResult, Range, RunConfig, ScalingStrategy};

/// Invoked after each band completes, in case a caller wants to stream
/// progress (e.g. the CLI's live summary). Never blocks the engine for
/// long — implementations should be cheap (printing, a channel send).
pub type ProgressCallback<'a> = dyn FnMut(u32, usize, &BandResult) + Send + 'a;

/// Build the ordered band plan for `cfg.strategy`. Band ids are 1-based and
/// dense. Every band shares the run's `warmup`/`band_duration`/`cooldown`.
#[must_use]
pub fn build_plan(cfg: &RunConfig) -> Vec<BandSpec> {
    let (workers, connections) = match &cfg.strategy {
        ScalingStrategy::Linear => (
            linear_steps(cfg.workers, cfg.bands),
            linear_steps(cfg.connections, cfg.bands),
        ),
        ScalingStrategy::Exponential => (
            exponential_steps(cfg.workers, cfg.bands),
            exponential_steps(cfg.connections, cfg.bands),
        ),
        ScalingStrategy::Fibonacci => (
            fibonacci_steps(cfg.workers, cfg.bands),
            fibonacci_steps(cfg.connections, cfg.bands),
        ),
        ScalingStrategy::Custom { workers, connections } => (workers.clone(), connections.clone()),
    };

    workers
        .into_iter()
        .zip(connections)
        .enumerate()
        .map(|(i, (w, c))| BandSpec {
            band_id: (i + 1) as u32,
            workers: w,
            connections: c,
            warmup: cfg.warmup,
            measure: cfg.band_duration,
            cooldown: cfg.cooldown,
        })
        .collect()
}

fn linear_steps(range: Range, bands: usize) -> Vec<usize> {
    if bands <= 1 {
        return vec![range.min];
    }
    (0..bands)
        .map(|i| {
            let step = (i as f64) * ((range.max - range.min) as f64) / ((bands - 1) as f64);
            range.min + step.round() as usize
        })
        .collect()
}

fn exponential_steps(range: Range, bands: usize) -> Vec<usize> {
    if bands <= 1 || range.min == 0 {
        return vec![range.min.max(1); bands.max(1)];
    }
    let ratio = range.max as f64 / range.min as f64;
    (0..bands)
        .map(|i| {
            let exponent = i as f64 / (bands - 1) as f64;
            (range.min as f64 * ratio.powf(exponent)).round() as usize
        })
        .collect()
}

/// Generate `bands` Fibonacci numbers starting `1, 1, 2, 3, 5, ...` and
/// linearly rescale them so the first maps to `range.min` and the last to
/// `range.max`.
fn fibonacci_steps(range: Range, bands: usize) -> Vec<usize> {
    if bands <= 1 {
        return vec![range.min];
    }
    let mut fib = Vec::with_capacity(bands);
    let (mut a, mut b) = (1u64, 1u64);
    for _ in 0..bands {
        fib.push(a as f64);
        let next = a + b;
        a = b;
        b = next;
    }
    let fib_min = fib[0];
    let fib_max = fib[fib.len() - 1];
    let span = (fib_max - fib_min).max(1e-9);
    fib.into_iter()
        .map(|f| {
            let normalized = (f - fib_min) / span;
            range.min + (normalized * (range.max - range.min) as f64).round() as usize
        })
        .collect()
}

fn trapezoidal_area(points: &[(f64, f64)]) -> f64 {
    points
        .windows(2)
        .map(|w| {
            let (x0, y0) = w[0];
            let (x1, y1) = w[1];
            0.5 * (y0 + y1) * (x1 - x0)
        })
        .sum()
}

fn tps_per_connection(b: &BandResult) -> f64 {
    if b.connections > 0 {
        b.performance.tps / b.connections as f64
    } else {
        0.0
    }
}

fn find_optimal_band(bands: &[BandResult]) -> Option<u32> {
    bands
        .iter()
        .filter(|b| !b.failed)
        .max_by(|a, b| {
            let ra = tps_per_connection(a);
            let rb = tps_per_connection(b);
            ra.partial_cmp(&rb)
                .unwrap()
                .then(b.performance.p95_latency_ms.partial_cmp(&a.performance.p95_latency_ms).unwrap())
        })
        .map(|b| b.band_id)
}

fn scaling_efficiency(bands: &[BandResult]) -> f64 {
    let Some(first) = bands.first() else { return 0.0 };
    let Some(last) = bands.last() else { return 0.0 };
    let first_rate = tps_per_connection(first);
    if first_rate <= 0.0 {
        0.0
    } else {
        tps_per_connection(last) / first_rate
    }
}

/// Run every band in `plan` sequentially, never in parallel, so concurrent
/// bands can't contaminate each other's measurements. Calls
/// `workload.setup` once before the first band and `workload.cleanup` once
/// after the last, regardless of per-band failures.
pub async fn run_progressive(
    cfg: &RunConfig,
    workload: Arc<dyn Workload>,
    env: &Env,
    cancel: &CancelToken,
    mut progress: Option<&mut ProgressCallback<'_>>,
) -> Result<ProgressiveResult, StormError> {
    cfg.validate().map_err(StormError::ConfigInvalid)?;
    let plan = build_plan(cfg);
    let total = plan.len();

    workload.setup(cancel, cfg).await.map_err(|e| StormError::SetupFailed(e.to_string()))?;

    let band_cfg: BandRunnerConfig = cfg.clone();

    let mut results = Vec::with_capacity(total);
    let mut run_error = None;

    for spec in &plan {
        if cancel.is_cancelled() {
            run_error = Some(StormError::Canceled);
            break;
        }
        match run_band(spec, &workload, &band_cfg, env, cancel).await {
            Ok(result) => {
                if let Some(cb) = progress.as_mut() {
                    cb(spec.band_id, total, &result);
                }
                results.push(result);
            }
            Err(StormError::Canceled) => {
                run_error = Some(StormError::Canceled);
                break;
            }
            Err(e) => {
                warn!(band_id = spec.band_id, error = %e, "band aborted unexpectedly");
                run_error = Some(e);
                break;
            }
        }
    }

    if let Err(e) = workload.cleanup(cancel, cfg).await {
        warn!(error = %e, "workload cleanup failed; proceeding with results gathered so far");
    }

    if let Some(e) = run_error {
        if results.is_empty() {
            return Err(e);
        }
        info!(bands_completed = results.len(), total, "run ended early: {e}");
    }

    results.sort_by_key(|b| b.connections);

    let analysis: Analysis = analyzer::analyze(&results);
    let total_capacity = trapezoidal_area(
        &results
            .iter()
            .map(|b| (b.connections as f64, b.performance.tps))
            .collect::<Vec<_>>(),
    );
    let optimal_band = find_optimal_band(&results);
    let efficiency = scaling_efficiency(&results);

    Ok(ProgressiveResult {
        bands: results,
        analysis,
        optimal_band,
        total_capacity,
        scaling_efficiency: efficiency,
    })
}
