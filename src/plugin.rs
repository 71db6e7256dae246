//! Workload plugin contract (C9, external collaborator) and an in-memory
//! registry.
//!
//! Workload plugins are genuinely polymorphic across build-time-unknown
//! types, so they're modeled behind a trait object rather than a closed
//! enum (contrast with [`crate::types::ScalingStrategy`], which *is* a
//! closed set). The core never inspects a plugin's body beyond calling
//! `setup`/`run`/`cleanup`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::env::CancelToken;
use crate::error::StormError;
use crate::types::RunConfig;

/// Metrics sink contract exposed to plugins (distinct from the internal
/// `StreamingMetricsCollector` that implements it — plugins only see this
/// trait, never the collector's own admin methods like `stop_collection`).
pub trait MetricsRecorder: Send + Sync {
    fn record_transaction(&self, success: bool, latency_ns: i64);
    fn record_query(&self, kind: &str, rows_affected: i64);
    fn record_error(&self, err: &str);
    fn record_custom_metric(&self, name: &str, value: f64);
    fn current_tps(&self) -> f64;
    fn current_latency_p95(&self) -> f64;
    fn current_error_rate(&self) -> f64;
}

/// A metrics recorder that discards everything, used for the warmup phase
/// where metrics are intentionally thrown away.
pub struct NullCollector;

impl MetricsRecorder for NullCollector {
    fn record_transaction(&self, _success: bool, _latency_ns: i64) {}
    fn record_query(&self, _kind: &str, _rows_affected: i64) {}
    fn record_error(&self, _err: &str) {}
    fn record_custom_metric(&self, _name: &str, _value: f64) {}
    fn current_tps(&self) -> f64 {
        0.0
    }
    fn current_latency_p95(&self) -> f64 {
        0.0
    }
    fn current_error_rate(&self) -> f64 {
        0.0
    }
}

/// Static metadata describing a workload plugin.
#[derive(Debug, Clone)]
pub struct WorkloadMetadata {
    pub name: String,
    pub version: String,
    pub api_version: String,
    pub supported_types: Vec<String>,
    pub required_extensions: Vec<String>,
    pub min_target_version: String,
}

/// The workload plugin contract. The core treats implementors as opaque:
/// it calls `setup`, `run`, `cleanup` and reads `metadata`, nothing more.
#[async_trait]
pub trait Workload: Send + Sync {
    fn metadata(&self) -> WorkloadMetadata;

    async fn setup(&self, ctx: &CancelToken, cfg: &RunConfig) -> Result<(), StormError>;

    /// Execute the workload until `ctx` is canceled, reporting through
    /// `metrics`. May also return early with an error; the band runner
    /// maps that to `RunFailed` and continues to the next band.
    async fn run(
        &self,
        ctx: &CancelToken,
        cfg: &RunConfig,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Result<(), StormError>;

    async fn cleanup(&self, ctx: &CancelToken, cfg: &RunConfig) -> Result<(), StormError>;
}

/// In-memory plugin registry. Dynamic loading/sandboxing is a separate
/// concern; this only models discovery, lookup, and health-checking over
/// whatever plugins were registered at process start.
#[derive(Default)]
pub struct Registry {
    plugins: HashMap<String, Arc<dyn Workload>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn Workload>) {
        let name = plugin.metadata().name;
        self.plugins.insert(name, plugin);
    }

    /// Number of usable workload types.
    #[must_use]
    pub fn discover(&self) -> usize {
        self.plugins.len()
    }

    pub fn get(&self, workload_name: &str) -> Result<Arc<dyn Workload>, StormError> {
        self.plugins
            .get(workload_name)
            .cloned()
            .ok_or_else(|| StormError::PluginUnavailable(workload_name.to_string()))
    }

    /// Validation (checksums, trusted-author lists, manifest matching) is
    /// outside this core; a registered plugin is treated as already valid,
    /// so `health_check` only confirms it still resolves by name.
    pub fn health_check(&self, workload_name: &str) -> Result<WorkloadMetadata, StormError> {
        self.get(workload_name).map(|p| p.metadata())
    }

    #[must_use]
    pub fn list(&self) -> Vec<WorkloadMetadata> {
        self.plugins.values().map(|p| p.metadata()).collect()
    }
}

/// A synthetic demo workload used by the engine's own tests and by the
/// `health`/`list-plugins` CLI smoke paths. Generates synthetic latency
/// instead of talking to a real database — real workload bodies are
/// outside this core's scope.
pub struct DemoWorkload {
    pub name: String,
    pub base_latency_ms: f64,
    pub failure_rate: f64,
}

#[async_trait]
impl Workload for DemoWorkload {
    fn metadata(&self) -> WorkloadMetadata {
        WorkloadMetadata {
            name: self.name.clone(),
            version: "0.1.0".into(),
            api_version: "1.0".into(),
            supported_types: vec!["synthetic".into()],
            required_extensions: vec![],
            min_target_version: "0".into(),
        }
    }

    async fn setup(&self, _ctx: &CancelToken, _cfg: &RunConfig) -> Result<(), StormError> {
        Ok(())
    }

    async fn run(
        &self,
        ctx: &CancelToken,
        cfg: &RunConfig,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Result<(), StormError> {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::from_entropy();
        loop {
            if ctx.is_cancelled() {
                return Ok(());
            }
            let jitter_ms = rng.gen_range(0.0..self.base_latency_ms.max(0.1));
            let latency_ns = ((self.base_latency_ms + jitter_ms) * 1_000_000.0) as i64;
            let success = rng.gen_bool((1.0 - self.failure_rate).clamp(0.0, 1.0));
            metrics.record_transaction(success, latency_ns);
            if !success {
                metrics.record_error("synthetic_failure");
            }
            metrics.record_query("select", 1);
            let sleep_ms = (1000.0 / cfg.workers.max.max(1) as f64).max(1.0);
            if !ctx.sleep(std::time::Duration::from_millis(sleep_ms as u64)).await {
                return Ok(());
            }
        }
    }

    async fn cleanup(&self, _ctx: &CancelToken, _cfg: &RunConfig) -> Result<(), StormError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_discover_and_get() {
        let mut registry = Registry::new();
        registry.register(Arc::new(DemoWorkload {
            name: "demo".into(),
            base_latency_ms: 1.0,
            failure_rate: 0.0,
        }));
        assert_eq!(registry.discover(), 1);
        assert!(registry.get("demo").is_ok());
        assert!(registry.get("missing").is_err());
    }

    #[test]
    fn health_check_reports_metadata() {
        let mut registry = Registry::new();
        registry.register(Arc::new(DemoWorkload {
            name: "demo".into(),
            base_latency_ms: 1.0,
            failure_rate: 0.0,
        }));
        let meta = registry.health_check("demo").unwrap();
        assert_eq!(meta.api_version, "1.0");
    }

    #[test]
    fn list_returns_all_registered() {
        let mut registry = Registry::new();
        registry.register(Arc::new(DemoWorkload {
            name: "a".into(),
            base_latency_ms: 1.0,
            failure_rate: 0.0,
        }));
        registry.register(Arc::new(DemoWorkload {
            name: "b".into(),
            base_latency_ms: 1.0,
            failure_rate: 0.0,
        }));
        assert_eq!(registry.list().len(), 2);
    }
}
