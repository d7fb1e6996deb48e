//! Korean real-estate data tool server over stdio.
//!
//! Reads API keys from the `PUBLIC_DATA_API_KEY` and `ECOS_API_KEY`
//! environment variables. Logs go to stderr; stdout carries the protocol.
//!
//! # Examples
//!
//! ```sh
//! # Default cache location, 24h freshness window
//! ondol
//!
//! # Explicit cache dir, shorter freshness, no background sweep
//! ondol --cache-dir /var/cache/ondol --freshness-hours 6 --no-sweep
//! ```

use clap::Parser;
use ondol_rs::cache::sweep;
use ondol_rs::config::ServerConfig;
use ondol_rs::server::run_stdio;
use ondol_rs::tools::{ServerContext, build_registry};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

/// Korean real-estate data tool server (MCP over stdio).
#[derive(Parser)]
#[command(name = "ondol", version)]
struct Cli {
    /// Cache directory. Defaults to ONDOL_CACHE_DIR, then the user cache dir.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Freshness window in hours: cached entries younger than this are
    /// served without a refresh attempt.
    #[arg(long, default_value_t = 24)]
    freshness_hours: u64,

    /// Upstream request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Retry budget for transient upstream failures.
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Hours between retention sweeps.
    #[arg(long, default_value_t = 6)]
    sweep_interval_hours: u64,

    /// Days after which cached artifacts are deleted by the sweep.
    #[arg(long, default_value_t = 7)]
    retention_days: u64,

    /// Disable the background retention sweep.
    #[arg(long)]
    no_sweep: bool,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // stderr only: stdout is the JSON-RPC channel.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = ServerConfig::from_env();
    if let Some(dir) = cli.cache_dir {
        config.cache_dir = dir;
    }
    config.freshness = Duration::from_secs(cli.freshness_hours * 3600);
    config.timeout = Duration::from_secs(cli.timeout_secs);
    config.max_retries = cli.retries;
    config.sweep_interval = Duration::from_secs(cli.sweep_interval_hours * 3600);
    config.max_retention = Duration::from_secs(cli.retention_days * 24 * 3600);
    // An interval of zero would make no sense as a ticker; treat it as off.
    config.sweep_enabled = !cli.no_sweep && cli.sweep_interval_hours > 0;

    if config.public_data_api_key.is_none() {
        tracing::warn!(
            "PUBLIC_DATA_API_KEY is not set; transaction and district tools will fail"
        );
    }
    if config.ecos_api_key.is_none() {
        tracing::warn!("ECOS_API_KEY is not set; indicator tools will fail");
    }

    let sweep_enabled = config.sweep_enabled;
    let sweep_interval = config.sweep_interval;
    let max_retention = config.max_retention;

    let ctx = match ServerContext::new(config) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    if sweep_enabled {
        sweep::spawn(ctx.store().clone(), sweep_interval, max_retention);
    }

    let registry = Arc::new(build_registry(ctx));
    if let Err(e) = run_stdio(registry).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
