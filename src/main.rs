use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use stormdb::cli::{Cli, Command};
use stormdb::config::build_run_config;
use stormdb::engine::run_progressive;
use stormdb::env::{CancelToken, Env};
use stormdb::error::StormError;
use stormdb::plugin::{DemoWorkload, Registry};
use stormdb::sink::NullSink;

fn build_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register(Arc::new(DemoWorkload {
        name: "demo".into(),
        base_latency_ms: 2.0,
        failure_rate: 0.01,
    }));
    registry
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let registry = build_registry();

    let result = match cli.command {
        Command::Run(args) => run(&registry, args, cli.no_summary).await,
        Command::Setup(args) => setup(&registry, &args.workload, false).await,
        Command::Rebuild(args) => setup(&registry, &args.workload, true).await,
        Command::ListPlugins => {
            for meta in registry.list() {
                println!("{} v{} (api {})", meta.name, meta.version, meta.api_version);
            }
            Ok(())
        }
        Command::Health(args) => match registry.health_check(&args.workload) {
            Ok(meta) => {
                println!("{} is healthy (api {})", meta.name, meta.api_version);
                Ok(())
            }
            Err(e) => Err(e),
        },
    };

    match result {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            error!(error = %e, "stormdb exiting with error");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn setup(registry: &Registry, workload_name: &str, rebuild: bool) -> Result<(), StormError> {
    let workload = registry.get(workload_name)?;
    let cancel = CancelToken::new();
    let cfg = stormdb::types::RunConfig {
        workload_name: workload_name.to_string(),
        target_duration: std::time::Duration::ZERO,
        strategy: stormdb::types::ScalingStrategy::Linear,
        workers: stormdb::types::Range::new(1, 1),
        connections: stormdb::types::Range::new(1, 1),
        bands: 1,
        band_duration: std::time::Duration::from_secs(1),
        warmup: std::time::Duration::ZERO,
        cooldown: std::time::Duration::ZERO,
        memory: stormdb::types::MemoryCaps::default(),
        priority_queue_capacity: 16,
        breaker: stormdb::types::CircuitBreakerConfig::default(),
        adaptive: stormdb::types::AdaptiveConfig {
            enabled: false,
            ..stormdb::types::AdaptiveConfig::default()
        },
    };
    if rebuild {
        info!(workload = workload_name, "rebuild: tearing down existing fixtures");
        workload.cleanup(&cancel, &cfg).await?;
    }
    workload.setup(&cancel, &cfg).await.map_err(|e| StormError::SetupFailed(e.to_string()))
}

async fn run(registry: &Registry, args: stormdb::cli::RunArgs, no_summary: bool) -> Result<(), StormError> {
    let workload = registry.get(&args.workload)?;
    let cfg = build_run_config(&args)?;
    let env = Env::default();
    let cancel = CancelToken::new();

    let cancel_on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_on_ctrl_c.cancel();
        }
    });

    let quiet = no_summary;
    let mut progress = move |band_id: u32, total: usize, result: &stormdb::types::BandResult| {
        if !quiet {
            println!(
                "band {band_id}/{total}: {:.1} tps, p95 {:.1}ms, error_rate {:.2}%",
                result.performance.tps,
                result.performance.p95_latency_ms,
                result.performance.error_rate * 100.0,
            );
        }
    };

    let result = run_progressive(&cfg, workload, &env, &cancel, Some(&mut progress)).await?;

    println!(
        "run complete: {} bands, optimal band {:?}, total capacity {:.1}, scaling efficiency {:.2}",
        result.bands.len(),
        result.optimal_band,
        result.total_capacity,
        result.scaling_efficiency,
    );

    let sink = NullSink;
    let meta = stormdb::sink::RunMeta {
        run_id: uuid::Uuid::new_v4().to_string(),
        workload_name: args.workload.clone(),
        started_at: chrono::Utc::now(),
        finished_at: chrono::Utc::now(),
        schema_version: 1,
    };
    if let Err(e) = stormdb::sink::ResultsSink::store_run(&sink, &meta, &result).await {
        error!(error = %e, "results sink write failed; continuing, results already printed");
    }

    if cancel.is_cancelled() {
        return Err(StormError::Canceled);
    }
    Ok(())
}
