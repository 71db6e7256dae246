//! Results sink contract (external collaborator): a write-only
//! destination for run metadata and final metrics, invoked once at
//! end-of-run. Persistent storage, schema design, and retention policy
//! live entirely on the other side of this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StormError;
use crate::types::ProgressiveResult;

/// Run-level metadata accompanying a stored result. `schema_version` is
/// reserved for the sink implementation; the core never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_id: String,
    pub workload_name: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
    pub schema_version: u32,
}

#[async_trait]
pub trait ResultsSink: Send + Sync {
    /// Persist the final metrics for a completed (or partially completed,
    /// if canceled) run. A failure here is logged and does not alter the
    /// `ProgressiveResult` already returned to the caller.
    async fn store_run(&self, run_meta: &RunMeta, final_metrics: &ProgressiveResult) -> Result<(), StormError>;

    /// Perform sink-specific retention/compaction maintenance. Optional;
    /// the default implementation is a no-op.
    async fn perform_maintenance(&self) -> Result<(), StormError> {
        Ok(())
    }
}

/// A sink that logs but never fails, useful for CLI runs without a
/// configured backing store and for tests.
pub struct NullSink;

#[async_trait]
impl ResultsSink for NullSink {
    async fn store_run(&self, run_meta: &RunMeta, final_metrics: &ProgressiveResult) -> Result<(), StormError> {
        let payload = serde_json::to_string(final_metrics)
            .map_err(|e| StormError::SinkWriteFailed(e.to_string()))?;
        tracing::debug!(run_id = %run_meta.run_id, bytes = payload.len(), "null results sink: discarding final metrics");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Analysis;

    #[tokio::test]
    async fn null_sink_always_succeeds() {
        let sink = NullSink;
        let meta = RunMeta {
            run_id: "r1".into(),
            workload_name: "demo".into(),
            started_at: chrono::Utc::now(),
            finished_at: chrono::Utc::now(),
            schema_version: 1,
        };
        let result = ProgressiveResult {
            bands: vec![],
            analysis: Analysis::empty(),
            optimal_band: None,
            total_capacity: 0.0,
            scaling_efficiency: 0.0,
        };
        assert!(sink.store_run(&meta, &result).await.is_ok());
    }
}
