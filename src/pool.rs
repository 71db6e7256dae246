//! Priority worker pool (C4): dispatches jobs across three priority
//! channels to a dynamically sized worker set.
//!
//! Grounded on the teacher's `Semaphore`-gated `tokio::spawn` + `join_all`
//! batching (`run_operational_simulation`) for the dispatch-to-worker
//! shape, and on `other_examples/.../worker.rs`'s absolute-time
//! (`Instant` arithmetic) scheduling idiom for the adaptive-scaling tick
//! in `run_adjustment_loop`.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, warn};

use crate::env::CancelToken;
use crate::error::StormError;
use crate::types::Priority;

/// A unit of work dispatched through the pool. The payload is an opaque,
/// panic-isolated async closure; the pool never inspects it beyond
/// invoking it and catching a panic.
pub struct Job {
    pub id: u64,
    pub priority: Priority,
    pub max_retries: u32,
    pub retry_count: u32,
    pub deadline: Option<Duration>,
    payload: Box<dyn FnOnce() -> futures::future::BoxFuture<'static, Result<(), String>> + Send>,
    report: Option<mpsc::UnboundedSender<(u64, Result<(), String>)>>,
}

impl Job {
    pub fn new<F, Fut>(id: u64, priority: Priority, max_retries: u32, payload: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), String>> + Send + 'static,
    {
        Self {
            id,
            priority,
            max_retries,
            retry_count: 0,
            deadline: None,
            payload: Box::new(move || Box::pin(payload())),
            report: None,
        }
    }

    /// Have the pool send this job's terminal outcome (success, error, or
    /// panic) back over `tx` once it finishes, so a caller that doesn't wait
    /// on the job directly can still observe a genuine failure.
    #[must_use]
    pub fn with_report(mut self, tx: mpsc::UnboundedSender<(u64, Result<(), String>)>) -> Self {
        self.report = Some(tx);
        self
    }
}

/// One adaptive scaling decision for the pool's worker count.
#[derive(Debug, Clone, Copy)]
pub struct AdjustmentEvent {
    pub old_worker_count: usize,
    pub new_worker_count: usize,
    pub utilization: f64,
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PoolMetrics {
    pub total_jobs: u64,
    pub failed_jobs: u64,
    pub retried_jobs: u64,
}

struct Channels {
    high: mpsc::Sender<Job>,
    normal: mpsc::Sender<Job>,
    low: mpsc::Sender<Job>,
    high_rx_depth: Arc<AtomicUsize>,
    normal_rx_depth: Arc<AtomicUsize>,
    low_rx_depth: Arc<AtomicUsize>,
}

/// Scaling strategy used by the pool's adaptive-worker-count tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerScalingMode {
    Linear,
    Exponential,
}

/// Dispatches jobs across High/Normal/Low priority channels to a worker
/// set gated by a semaphore permit per active worker.
pub struct PriorityWorkerPool {
    channels: Channels,
    active_workers: Arc<AtomicUsize>,
    worker_limit: Arc<tokio::sync::Mutex<usize>>,
    semaphore: Arc<Semaphore>,
    metrics: Arc<tokio::sync::Mutex<PoolMetrics>>,
    submit_timeout: Duration,
    unit_backoff: Duration,
    cancel: CancelToken,
}

impl PriorityWorkerPool {
    /// `capacity` bounds each priority channel independently. `workers` is
    /// the starting worker count (and the initial semaphore permit count).
    #[must_use]
    pub fn new(capacity: usize, workers: usize, cancel: CancelToken) -> Self {
        let (high_tx, high_rx) = mpsc::channel(capacity);
        let (normal_tx, normal_rx) = mpsc::channel(capacity);
        let (low_tx, low_rx) = mpsc::channel(capacity);

        let high_depth = Arc::new(AtomicUsize::new(0));
        let normal_depth = Arc::new(AtomicUsize::new(0));
        let low_depth = Arc::new(AtomicUsize::new(0));

        let pool = Self {
            channels: Channels {
                high: high_tx,
                normal: normal_tx,
                low: low_tx,
                high_rx_depth: high_depth.clone(),
                normal_rx_depth: normal_depth.clone(),
                low_rx_depth: low_depth.clone(),
            },
            active_workers: Arc::new(AtomicUsize::new(0)),
            worker_limit: Arc::new(tokio::sync::Mutex::new(workers.max(1))),
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
            metrics: Arc::new(tokio::sync::Mutex::new(PoolMetrics::default())),
            submit_timeout: Duration::from_secs(5),
            unit_backoff: Duration::from_millis(50),
            cancel,
        };

        pool.spawn_dispatcher(high_rx, normal_rx, low_rx, high_depth, normal_depth, low_depth);
        pool
    }

    /// Total queued jobs across all three priority channels.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.channels.high_rx_depth.load(Ordering::Relaxed)
            + self.channels.normal_rx_depth.load(Ordering::Relaxed)
            + self.channels.low_rx_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn active_worker_count(&self) -> usize {
        self.active_workers.load(Ordering::Relaxed)
    }

    pub async fn metrics(&self) -> PoolMetrics {
        *self.metrics.lock().await
    }

    /// Enqueue `job` on its priority channel. Waits up to the submit
    /// timeout (default 5s) for room, then rejects with `QueueFull`.
    pub async fn submit(&self, job: Job) -> Result<(), StormError> {
        let sender = match job.priority {
            Priority::High => &self.channels.high,
            Priority::Normal => &self.channels.normal,
            Priority::Low => &self.channels.low,
        };
        let depth = match job.priority {
            Priority::High => &self.channels.high_rx_depth,
            Priority::Normal => &self.channels.normal_rx_depth,
            Priority::Low => &self.channels.low_rx_depth,
        };

        match tokio::time::timeout(self.submit_timeout, sender.send(job)).await {
            Ok(Ok(())) => {
                depth.fetch_add(1, Ordering::Relaxed);
                let mut m = self.metrics.lock().await;
                m.total_jobs += 1;
                Ok(())
            }
            Ok(Err(_)) => Err(StormError::QueueFull("channel closed".into())),
            Err(_) => Err(StormError::QueueFull("submit timed out".into())),
        }
    }

    fn spawn_dispatcher(
        &self,
        mut high_rx: mpsc::Receiver<Job>,
        mut normal_rx: mpsc::Receiver<Job>,
        mut low_rx: mpsc::Receiver<Job>,
        high_depth: Arc<AtomicUsize>,
        normal_depth: Arc<AtomicUsize>,
        low_depth: Arc<AtomicUsize>,
    ) {
        let semaphore = self.semaphore.clone();
        let active_workers = self.active_workers.clone();
        let metrics = self.metrics.clone();
        let cancel = self.cancel.clone();
        let unit_backoff = self.unit_backoff;

        tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    break;
                }

                // Strict priority order: High drained before Normal before Low.
                let next = tokio::select! {
                    biased;
                    Some(job) = high_rx.recv() => { high_depth.fetch_sub(1, Ordering::Relaxed); Some(job) }
                    Some(job) = normal_rx.recv() => { normal_depth.fetch_sub(1, Ordering::Relaxed); Some(job) }
                    Some(job) = low_rx.recv() => { low_depth.fetch_sub(1, Ordering::Relaxed); Some(job) }
                    () = cancel.cancelled() => None,
                };

                let Some(mut job) = next else { break };

                // No idle worker right now: retry acquiring a permit with
                // linear backoff rather than holding the job indefinitely.
                let permit = loop {
                    match semaphore.clone().try_acquire_owned() {
                        Ok(p) => break Some(p),
                        Err(_) if job.retry_count < job.max_retries => {
                            job.retry_count += 1;
                            metrics.lock().await.retried_jobs += 1;
                            tokio::time::sleep(unit_backoff * job.retry_count).await;
                        }
                        Err(_) => break None,
                    }
                };

                let Some(permit) = permit else {
                    let mut m = metrics.lock().await;
                    m.failed_jobs += 1;
                    warn!(job_id = job.id, "job failed: no idle worker after max retries");
                    continue;
                };

                active_workers.fetch_add(1, Ordering::Relaxed);
                let metrics_cloned = metrics.clone();
                let active_workers_cloned = active_workers.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    run_job(job, metrics_cloned).await;
                    active_workers_cloned.fetch_sub(1, Ordering::Relaxed);
                });
            }
        });
    }

    /// Adaptively resize the worker pool's semaphore permits every
    /// `interval`, based on utilization and queue depth.
    pub fn spawn_adjustment_loop(
        &self,
        interval: Duration,
        target_utilization: f64,
        max_concurrency: usize,
        mode: WorkerScalingMode,
    ) -> tokio::task::JoinHandle<Vec<AdjustmentEvent>> {
        let active_workers = self.active_workers.clone();
        let worker_limit = self.worker_limit.clone();
        let semaphore = self.semaphore.clone();
        let cancel = self.cancel.clone();
        let queue_depth_fn = {
            let high = self.channels.high_rx_depth.clone();
            let normal = self.channels.normal_rx_depth.clone();
            let low = self.channels.low_rx_depth.clone();
            move || {
                high.load(Ordering::Relaxed) + normal.load(Ordering::Relaxed) + low.load(Ordering::Relaxed)
            }
        };

        tokio::spawn(async move {
            let mut events = Vec::new();
            let mut next_tick = tokio::time::Instant::now() + interval;
            loop {
                tokio::select! {
                    () = tokio::time::sleep_until(next_tick) => {}
                    () = cancel.cancelled() => break,
                }
                next_tick += interval;

                let active = active_workers.load(Ordering::Relaxed);
                let mut limit = worker_limit.lock().await;
                let utilization = if *limit == 0 { 0.0 } else { active as f64 / *limit as f64 };
                let queue_depth = queue_depth_fn();

                let old = *limit;
                if utilization > target_utilization && queue_depth > 0 {
                    *limit = match mode {
                        WorkerScalingMode::Linear => (*limit + 1).min(max_concurrency),
                        WorkerScalingMode::Exponential => (((*limit as f64) * 1.2).ceil() as usize).min(max_concurrency),
                    };
                } else if utilization < target_utilization / 2.0 && queue_depth == 0 {
                    let floor = 1;
                    *limit = match mode {
                        WorkerScalingMode::Linear => ((*limit).saturating_sub(1)).max(floor),
                        WorkerScalingMode::Exponential => (((*limit as f64) * 0.8).floor() as usize).max(floor),
                    };
                }
                *limit = (*limit).clamp(1, max_concurrency);

                if *limit > old {
                    semaphore.add_permits(*limit - old);
                } else if *limit < old {
                    // Permits are released naturally as in-flight jobs finish;
                    // we can't safely revoke outstanding permits, so we just
                    // lower the target and let natural attrition shrink it.
                }

                if *limit != old {
                    let event = AdjustmentEvent {
                        old_worker_count: old,
                        new_worker_count: *limit,
                        utilization,
                        queue_depth,
                    };
                    info!(
                        old_worker_count = event.old_worker_count,
                        new_worker_count = event.new_worker_count,
                        utilization,
                        queue_depth,
                        "pool adjustment"
                    );
                    events.push(event);
                }
            }
            events
        })
    }
}

/// Invoke the job's payload, catching panics and converting them to a
/// recorded failure rather than letting them crash the pool.
async fn run_job(job: Job, metrics: Arc<tokio::sync::Mutex<PoolMetrics>>) {
    let id = job.id;
    let report = job.report.clone();
    let fut = (job.payload)();
    let result = AssertUnwindSafe(fut).catch_unwind().await;
    let outcome: Result<(), String> = match &result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.clone()),
        Err(_) => Err("job panicked".to_string()),
    };
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            let mut m = metrics.lock().await;
            m.failed_jobs += 1;
            warn!(job_id = id, error = %e, "job failed");
        }
        Err(_panic) => {
            let mut m = metrics.lock().await;
            m.failed_jobs += 1;
            error!(job_id = id, "job panicked; pool continues");
        }
    }
    if let Some(tx) = report {
        let _ = tx.send((id, outcome));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[tokio::test]
    async fn submits_and_runs_job() {
        let pool = PriorityWorkerPool::new(16, 4, CancelToken::new());
        let counter = Arc::new(AtomicU64::new(0));
        let c = counter.clone();
        let job = Job::new(1, Priority::Normal, 0, move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        });
        pool.submit(job).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn high_priority_drains_before_low() {
        let pool = PriorityWorkerPool::new(16, 1, CancelToken::new());
        let order = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        // Saturate the single worker first so both jobs queue up.
        let block = Arc::new(tokio::sync::Notify::new());
        let block2 = block.clone();
        pool.submit(Job::new(0, Priority::Normal, 0, move || {
            let block2 = block2.clone();
            async move {
                block2.notified().await;
                Ok(())
            }
        }))
        .await
        .unwrap();
        tokio::task::yield_now().await;

        let o1 = order.clone();
        pool.submit(Job::new(1, Priority::Low, 0, move || {
            let o1 = o1.clone();
            async move {
                o1.lock().await.push("low");
                Ok(())
            }
        }))
        .await
        .unwrap();

        let o2 = order.clone();
        pool.submit(Job::new(2, Priority::High, 0, move || {
            let o2 = o2.clone();
            async move {
                o2.lock().await.push("high");
                Ok(())
            }
        }))
        .await
        .unwrap();

        block.notify_one();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let recorded = order.lock().await;
        assert_eq!(recorded.first().copied(), Some("high"));
    }

    #[tokio::test]
    async fn panic_in_job_does_not_crash_pool() {
        let pool = PriorityWorkerPool::new(16, 2, CancelToken::new());
        let job = Job::new(1, Priority::Normal, 0, || async {
            panic!("boom");
            #[allow(unreachable_code)]
            Ok(())
        });
        pool.submit(job).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let m = pool.metrics().await;
        assert_eq!(m.failed_jobs, 1);

        // Pool still accepts new work after a panic.
        let counter = Arc::new(AtomicU64::new(0));
        let c = counter.clone();
        pool.submit(Job::new(2, Priority::Normal, 0, move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }))
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }
}
