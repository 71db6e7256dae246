//! Band runner (C6): drives one `BandSpec` through its warmup, measure, and
//! cooldown phases against a `Workload`, wiring the backpressure controller,
//! worker pool, and metrics collector together for the duration of a band.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::backpressure::BackpressureController;
use crate::env::{CancelToken, Env};
use crate::error::StormError;
use crate::metrics::StreamingMetricsCollector;
use crate::plugin::{MetricsRecorder, NullCollector, Workload};
use crate::pool::{Job, PriorityWorkerPool, WorkerScalingMode};
use crate::types::{BandResult, BandSpec, Priority, RunConfig};

/// The band runner only needs the run-wide config; everything band-specific
/// comes from the `BandSpec` it's called with.
pub type BandRunnerConfig = RunConfig;

/// Run one band end to end: warmup (metrics discarded) -> measure (metrics
/// collected into the returned `BandResult`) -> cooldown (drain in-flight
/// work, metrics discarded).
///
/// A measure-phase workload error is absorbed into `BandResult::failed`; the
/// run proceeds to the next band. Cancellation during warmup or cooldown
/// aborts the entire run by propagating `StormError::Canceled`.
pub async fn run_band(
    spec: &BandSpec,
    workload: &Arc<dyn Workload>,
    cfg: &BandRunnerConfig,
    env: &Env,
    cancel: &CancelToken,
) -> Result<BandResult, StormError> {
    info!(band_id = spec.band_id, workers = spec.workers, connections = spec.connections, "band starting");

    let backpressure = Arc::new(BackpressureController::new(
        spec.connections,
        spec.workers,
        cfg.priority_queue_capacity,
        cfg.adaptive,
    ));
    let pool = Arc::new(PriorityWorkerPool::new(cfg.priority_queue_capacity, spec.workers, cancel.clone()));
    let _adjustment_handle = pool.spawn_adjustment_loop(
        cfg.adaptive.adjustment_interval,
        cfg.adaptive.target_utilization,
        cfg.adaptive.max_concurrency,
        WorkerScalingMode::Linear,
    );

    run_phase(
        spec.band_id,
        spec.workers,
        spec.warmup,
        workload,
        Arc::new(NullCollector),
        &pool,
        &backpressure,
        cfg,
        cancel,
    )
    .await?;
    if cancel.is_cancelled() {
        return Err(StormError::Canceled);
    }

    let collector = Arc::new(StreamingMetricsCollector::new(
        cfg.memory.max_latency_samples,
        cfg.memory.max_tps_samples,
        env.clock.clone(),
    ));
    collector.start_collection(spec.band_id, spec.measure);
    collector.set_active_workers(spec.workers);

    let measure_outcome = run_phase(
        spec.band_id,
        spec.workers,
        spec.measure,
        workload,
        collector.clone() as Arc<dyn MetricsRecorder>,
        &pool,
        &backpressure,
        cfg,
        cancel,
    )
    .await;

    let worker_limit = spec.workers.max(pool.active_worker_count());
    let mut result = collector.stop_collection(spec.workers, spec.connections, worker_limit, spec.connections);

    if cancel.is_cancelled() {
        return Err(StormError::Canceled);
    }
    if let Err(e) = measure_outcome {
        warn!(band_id = spec.band_id, error = %e, "band measure phase failed; band marked failed");
        result.failed = true;
    }

    run_phase(
        spec.band_id,
        spec.workers,
        spec.cooldown,
        workload,
        Arc::new(NullCollector),
        &pool,
        &backpressure,
        cfg,
        cancel,
    )
    .await?;
    if cancel.is_cancelled() {
        return Err(StormError::Canceled);
    }

    info!(band_id = spec.band_id, tps = result.performance.tps, failed = result.failed, "band complete");
    Ok(result)
}

/// Run `workers` concurrent copies of the workload for `duration`, each
/// submitted through the pool as a Normal-priority job gated by a
/// backpressure worker slot. `Workload::run` is expected to loop internally
/// until its cancel token fires, so one job per worker is sufficient —
/// the pool's adaptive worker-count tick, not this function, governs how
/// many run concurrently if the band scales mid-phase.
async fn run_phase(
    band_id: u32,
    workers: usize,
    duration: Duration,
    workload: &Arc<dyn Workload>,
    metrics: Arc<dyn MetricsRecorder>,
    pool: &Arc<PriorityWorkerPool>,
    backpressure: &Arc<BackpressureController>,
    run_config: &RunConfig,
    cancel: &CancelToken,
) -> Result<(), StormError> {
    if duration.is_zero() || workers == 0 {
        return Ok(());
    }

    let phase_cancel = CancelToken::new();
    let mut first_error: Option<String> = None;
    let (report_tx, mut report_rx) = mpsc::unbounded_channel::<(u64, Result<(), String>)>();

    for i in 0..workers {
        let job_workload = workload.clone();
        let job_metrics = metrics.clone();
        let job_backpressure = backpressure.clone();
        let job_cancel = phase_cancel.clone();
        let job_cfg = run_config.clone();

        let job = Job::new(u64::from(band_id) * 1_000_000 + i as u64, Priority::Normal, 1, move || async move {
            if job_backpressure.acquire_worker().is_err() {
                return Err("backpressure rejected worker acquisition".to_string());
            }
            let outcome = job_workload.run(&job_cancel, &job_cfg, job_metrics).await;
            job_backpressure.release_worker();
            outcome.map_err(|e| e.to_string())
        })
        .with_report(report_tx.clone());

        if let Err(e) = pool.submit(job).await {
            first_error.get_or_insert_with(|| e.to_string());
        }
    }
    drop(report_tx);

    let phase_completed = tokio::select! {
        completed = async {
            tokio::time::sleep(duration).await;
            true
        } => completed,
        () = cancel.cancelled() => false,
    };

    phase_cancel.cancel();
    // Give in-flight workers a moment to observe cancellation before the
    // next phase starts sharing the same pool and backpressure controller.
    tokio::time::sleep(Duration::from_millis(5)).await;

    let mut job_error: Option<String> = None;
    while let Ok((_, outcome)) = report_rx.try_recv() {
        if let Err(e) = outcome {
            job_error.get_or_insert(e);
        }
    }

    if !phase_completed {
        return Err(StormError::Canceled);
    }
    if let Some(e) = first_error {
        return Err(StormError::RunFailed(e));
    }
    if let Some(e) = job_error {
        return Err(StormError::RunFailed(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{DemoWorkload, WorkloadMetadata};
    use crate::types::{AdaptiveConfig, CircuitBreakerConfig, MemoryCaps, Range};

    /// A workload whose `run` returns an error immediately, for exercising
    /// the measure-phase failure path that `DemoWorkload` never triggers.
    struct FailingWorkload;

    #[async_trait::async_trait]
    impl Workload for FailingWorkload {
        fn metadata(&self) -> WorkloadMetadata {
            WorkloadMetadata {
                name: "failing".into(),
                version: "0.1.0".into(),
                api_version: "1.0".into(),
                supported_types: vec![],
                required_extensions: vec![],
                min_target_version: "0".into(),
            }
        }

        async fn setup(&self, _ctx: &CancelToken, _cfg: &RunConfig) -> Result<(), StormError> {
            Ok(())
        }

        async fn run(
            &self,
            _ctx: &CancelToken,
            _cfg: &RunConfig,
            _metrics: Arc<dyn MetricsRecorder>,
        ) -> Result<(), StormError> {
            Err(StormError::RunFailed("synthetic job failure".into()))
        }

        async fn cleanup(&self, _ctx: &CancelToken, _cfg: &RunConfig) -> Result<(), StormError> {
            Ok(())
        }
    }

    fn run_config() -> RunConfig {
        RunConfig {
            workload_name: "demo".into(),
            target_duration: Duration::from_secs(60),
            strategy: crate::types::ScalingStrategy::Linear,
            workers: Range::new(2, 2),
            connections: Range::new(2, 2),
            bands: 1,
            band_duration: Duration::from_millis(50),
            warmup: Duration::from_millis(10),
            cooldown: Duration::from_millis(10),
            memory: MemoryCaps::default(),
            priority_queue_capacity: 64,
            breaker: CircuitBreakerConfig::default(),
            adaptive: AdaptiveConfig {
                enabled: false,
                ..AdaptiveConfig::default()
            },
        }
    }

    fn cfg() -> BandRunnerConfig {
        run_config()
    }

    fn spec() -> BandSpec {
        BandSpec {
            band_id: 1,
            workers: 2,
            connections: 2,
            warmup: Duration::from_millis(10),
            measure: Duration::from_millis(50),
            cooldown: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn band_produces_result_with_matching_id() {
        let workload: Arc<dyn Workload> = Arc::new(DemoWorkload {
            name: "demo".into(),
            base_latency_ms: 1.0,
            failure_rate: 0.0,
        });
        let env = Env::default();
        let cancel = CancelToken::new();
        let result = run_band(&spec(), &workload, &cfg(), &env, &cancel).await.unwrap();
        assert_eq!(result.band_id, 1);
        assert!(!result.failed);
    }

    #[tokio::test]
    async fn cancellation_during_measure_propagates() {
        let workload: Arc<dyn Workload> = Arc::new(DemoWorkload {
            name: "demo".into(),
            base_latency_ms: 1.0,
            failure_rate: 0.0,
        });
        let mut long_spec = spec();
        long_spec.measure = Duration::from_secs(30);
        let env = Env::default();
        let cancel = CancelToken::new();
        let canceler = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceler.cancel();
        });
        let result = run_band(&long_spec, &workload, &cfg(), &env, &cancel).await;
        assert!(matches!(result, Err(StormError::Canceled)));
    }

    #[tokio::test]
    async fn workload_failure_marks_band_failed_but_still_returns() {
        let workload: Arc<dyn Workload> = Arc::new(FailingWorkload);
        let env = Env::default();
        let cancel = CancelToken::new();
        let result = run_band(&spec(), &workload, &cfg(), &env, &cancel).await.unwrap();
        assert_eq!(result.band_id, 1);
        assert!(result.failed);
    }
}
