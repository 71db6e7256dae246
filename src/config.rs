//! Config assembly: turns CLI arguments into a validated `RunConfig`, plus
//! the `setup|rebuild` workload lifecycle policy referenced by §6.

use std::time::Duration;

use crate::cli::RunArgs;
use crate::error::StormError;
use crate::types::{
    AdaptiveConfig, CircuitBreakerConfig, MemoryCaps, Range, RunConfig, ScalingStrategy,
};

/// Controls whether `workload.setup` is expected to be idempotent (`Setup`)
/// or must tear down and recreate any fixtures first (`Rebuild`). The band
/// runner and progressive engine don't interpret this themselves — it's a
/// hint a `Workload` implementation may read out of `RunConfig` via its own
/// extension mechanism; it exists here purely as the CLI-facing toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupPolicy {
    Setup,
    Rebuild,
}

/// Build a `RunConfig` from parsed CLI arguments, applying the same
/// defaults used when a flag is omitted, then validating it.
pub fn build_run_config(args: &RunArgs) -> Result<RunConfig, StormError> {
    let workers = Range::new(args.workers_min, args.workers_max);
    let connections = Range::new(args.connections_min, args.connections_max);

    let strategy = match args.scale.as_str() {
        "linear" => ScalingStrategy::Linear,
        "exponential" => ScalingStrategy::Exponential,
        "fibonacci" => ScalingStrategy::Fibonacci,
        other => {
            return Err(StormError::ConfigInvalid(format!(
                "unknown scaling strategy '{other}'; expected linear, exponential, or fibonacci"
            )))
        }
    };

    let cfg = RunConfig {
        workload_name: args.workload.clone(),
        target_duration: Duration::from_secs(args.duration),
        strategy,
        workers,
        connections,
        bands: args.bands,
        band_duration: Duration::from_secs(args.duration / args.bands.max(1) as u64),
        warmup: Duration::from_secs(args.warmup),
        cooldown: Duration::from_secs(args.cooldown),
        memory: MemoryCaps::default(),
        priority_queue_capacity: args.queue_capacity,
        breaker: CircuitBreakerConfig::default(),
        adaptive: AdaptiveConfig {
            enabled: args.progressive,
            ..AdaptiveConfig::default()
        },
    };

    cfg.validate().map_err(StormError::ConfigInvalid)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> RunArgs {
        RunArgs {
            workload: "demo".into(),
            workers_min: 2,
            workers_max: 8,
            connections_min: 2,
            connections_max: 8,
            scale: "linear".into(),
            bands: 4,
            duration: 120,
            warmup: 5,
            cooldown: 5,
            queue_capacity: 1024,
            summary_interval: 5,
            progressive: true,
            collect_pg_stats: false,
        }
    }

    #[test]
    fn builds_valid_config_from_defaults() {
        let cfg = build_run_config(&args()).unwrap();
        assert_eq!(cfg.bands, 4);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_strategy() {
        let mut a = args();
        a.scale = "quadratic".into();
        assert!(build_run_config(&a).is_err());
    }
}
