//! Error taxonomy for the StormDB engine.
//!
//! Errors are classified by *kind* rather than by call site, matching the
//! propagation policy in the engine design: most plugin-facing failures
//! collapse into [`StormError::RunFailed`] so the analyzer always receives a
//! structurally valid band sequence, while a small set of kinds abort the
//! run outright.

use thiserror::Error;

/// The engine's error taxonomy.
///
/// Only [`StormError::ConfigInvalid`], [`StormError::PluginUnavailable`],
/// [`StormError::SetupFailed`], and [`StormError::Canceled`] terminate a run.
/// Everything else is either absorbed into a band's recorded failure state
/// or counted by a controller (circuit breaker, backpressure) without
/// surfacing to the caller.
#[derive(Debug, Error)]
pub enum StormError {
    /// Malformed `RunConfig`: bad ranges, missing fields, inconsistent
    /// scaling parameters. No run begins.
    #[error("invalid run configuration: {0}")]
    ConfigInvalid(String),

    /// The plugin registry could not produce a usable `Workload`.
    #[error("workload plugin unavailable: {0}")]
    PluginUnavailable(String),

    /// `workload.setup` returned an error. Aborts the run; data integrity
    /// cannot be assumed once setup has failed partway.
    #[error("workload setup failed: {0}")]
    SetupFailed(String),

    /// `workload.run` returned an error inside a band's measure phase. The
    /// band is marked failed but the run continues to the next band.
    #[error("workload run failed: {0}")]
    RunFailed(String),

    /// Cancellation propagated from the run root. The caller receives a
    /// partial `ProgressiveResult`.
    #[error("run canceled")]
    Canceled,

    /// A circuit breaker gated the call without invoking it.
    #[error("circuit breaker open for {breaker}")]
    CircuitOpen {
        /// Name of the tripped breaker.
        breaker: String,
    },

    /// A priority queue was full and the submit timeout elapsed.
    #[error("priority queue full: {0}")]
    QueueFull(String),

    /// A backpressure controller rejected an acquisition (limit reached or
    /// pressure above threshold).
    #[error("acquire rejected: {0}")]
    AcquireRejected(String),

    /// A per-call deadline was exceeded. Counted as a circuit-breaker
    /// failure, not treated as a cancellation.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The results sink failed to persist the final metrics. Logged; does
    /// not alter the `ProgressiveResult` already computed.
    #[error("results sink write failed: {0}")]
    SinkWriteFailed(String),
}

impl StormError {
    /// Whether this error kind terminates the run outright rather than
    /// being absorbed into a single band's result.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StormError::ConfigInvalid(_)
                | StormError::PluginUnavailable(_)
                | StormError::SetupFailed(_)
                | StormError::Canceled
        )
    }

    /// Maps this error onto the run-control exit code table in §6.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            StormError::Canceled => 130,
            StormError::ConfigInvalid(_) => 1,
            _ => 2,
        }
    }
}

/// Convenience alias used throughout the engine's internal APIs.
pub type StormResult<T> = Result<T, StormError>;
