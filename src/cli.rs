//! Run-control CLI surface: subcommands and flags per §6. Mirrors the
//! teacher's `clap` derive style (`#[arg(short, long, default_value_t)]`).

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "stormdb", about = "Programmable database load-generation and progressive-scaling benchmark engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Disable the periodic console summary entirely.
    #[arg(long, global = true, default_value_t = false)]
    pub no_summary: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a progressive benchmark.
    Run(RunArgs),
    /// Run workload.setup against the target without benchmarking.
    Setup(PluginArgs),
    /// Tear down and recreate workload fixtures, then run setup.
    Rebuild(PluginArgs),
    /// List every registered workload plugin.
    ListPlugins,
    /// Health-check a single workload plugin by name.
    Health(PluginArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Registered workload plugin to run.
    #[arg(short, long)]
    pub workload: String,

    /// Minimum worker count.
    #[arg(long, default_value_t = 2)]
    pub workers_min: usize,

    /// Maximum worker count.
    #[arg(long, default_value_t = 16)]
    pub workers_max: usize,

    /// Minimum connection count.
    #[arg(long, default_value_t = 2)]
    pub connections_min: usize,

    /// Maximum connection count.
    #[arg(long, default_value_t = 16)]
    pub connections_max: usize,

    /// Progressive scaling strategy: linear, exponential, or fibonacci.
    #[arg(long, default_value = "linear")]
    pub scale: String,

    /// Number of bands to run across the configured range.
    #[arg(short, long, default_value_t = 5)]
    pub bands: usize,

    /// Total run duration across all bands, in seconds.
    #[arg(short = 'D', long, default_value_t = 300)]
    pub duration: u64,

    /// Warmup duration per band, in seconds.
    #[arg(short, long, default_value_t = 10)]
    pub warmup: u64,

    /// Cooldown duration per band, in seconds.
    #[arg(long, default_value_t = 5)]
    pub cooldown: u64,

    /// Per-priority-channel queue capacity.
    #[arg(long, default_value_t = 1024)]
    pub queue_capacity: usize,

    /// Console summary interval, in seconds.
    #[arg(long, default_value_t = 5)]
    pub summary_interval: u64,

    /// Enable adaptive (backpressure-driven) scaling within each band.
    #[arg(long, default_value_t = true)]
    pub progressive: bool,

    /// Collect database-side statistics during the run, if the workload
    /// supports it. The core never interprets this beyond passing it
    /// through to the plugin.
    #[arg(long, default_value_t = false)]
    pub collect_pg_stats: bool,
}

#[derive(Args, Debug)]
pub struct PluginArgs {
    /// Registered workload plugin name.
    pub workload: String,
}
