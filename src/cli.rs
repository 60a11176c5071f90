//! Command-line interface for loadpulse
//!
//! Provides argument parsing and subcommand definitions for the binary.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::time::Duration;

/// Default configuration path; a missing default file is not an error
pub const DEFAULT_CONFIG_PATH: &str = "loadpulse.toml";

/// Traffic generation, backend probes and alert forwarding for a forum API
#[derive(Parser)]
#[command(name = "loadpulse")]
#[command(version)]
#[command(about = "Traffic generation, backend probes and alert forwarding for a forum API")]
#[command(
    long_about = "loadpulse drives fixed-rate and scenario traffic against a forum API, \
    benchmarks its endpoints one request at a time, checks the Prometheus, Jaeger and Loki backends that observe it, detects bottlenecks \
    from collected metrics, and forwards Alertmanager alerts to Telegram."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: String,

    /// Override `target.base_url` from the configuration
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by traffic commands
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct RunArgs {
    /// Duration in seconds
    #[arg(short, long, default_value_t = 30)]
    pub duration: u64,

    /// Print the self-metrics in Prometheus text format after the run
    #[arg(long)]
    pub print_metrics: bool,
}

impl RunArgs {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration)
    }
}

/// Which backend `check` probes
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckTarget {
    Metrics,
    Traces,
    Logs,
    All,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Fixed-rate load against one endpoint
    Load {
        /// Endpoint path relative to the base URL
        #[arg(short, long, default_value = "/boards")]
        endpoint: String,

        /// HTTP method
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// JSON request body
        #[arg(long)]
        payload: Option<String>,

        /// Requests per second
        #[arg(long, default_value_t = 10)]
        rps: u32,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Dependent-data scenario: list posts, then fetch each one
    NPlusOne {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Concurrent bursts against the slow endpoint
    Slow {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Concurrent large-payload board creation
    Memory {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Load, N+1, slow and memory in sequence
    All {
        #[arg(short, long, default_value = "/boards")]
        endpoint: String,

        #[arg(long, default_value_t = 10)]
        rps: u32,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Weighted virtual-user workload
    Users {
        /// Read-write users
        #[arg(long, default_value_t = 10)]
        contributors: usize,

        /// Read-only users
        #[arg(long, default_value_t = 0)]
        viewers: usize,

        /// Seed for reproducible task choices
        #[arg(long)]
        seed: Option<u64>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Sequential per-endpoint latency benchmark
    ///
    /// Without `--endpoint`, sweeps the default forum endpoints.
    Analyze {
        /// Benchmark only this endpoint path
        #[arg(short, long)]
        endpoint: Option<String>,

        /// HTTP method for `--endpoint`
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// JSON request body for `--endpoint`
        #[arg(long)]
        payload: Option<String>,

        /// Requests per endpoint
        #[arg(short = 'n', long, default_value_t = 10)]
        iterations: usize,
    },

    /// Probe the observability backends
    Check {
        #[arg(value_enum, default_value_t = CheckTarget::All)]
        target: CheckTarget,
    },

    /// Detect bottlenecks from Prometheus metrics
    Detect,

    /// Serve the Alertmanager webhook and forward alerts to Telegram
    AlertBot,

    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

impl Command {
    /// Commands that talk to the target API
    pub fn generates_traffic(&self) -> bool {
        matches!(
            self,
            Command::Load { .. }
                | Command::NPlusOne { .. }
                | Command::Slow { .. }
                | Command::Memory { .. }
                | Command::All { .. }
                | Command::Users { .. }
        )
    }
}
