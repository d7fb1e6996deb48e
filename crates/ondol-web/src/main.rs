//! HTTP front-end for the ondol tool server.
//!
//! Reads API keys from the `PUBLIC_DATA_API_KEY` and `ECOS_API_KEY`
//! environment variables.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p ondol-web
//! cargo run -p ondol-web -- --port 8080 --cache-dir /var/cache/ondol
//!
//! curl localhost:3001/api/tools
//! curl -X POST localhost:3001/api/call \
//!   -H 'content-type: application/json' \
//!   -d '{"name":"get_apt_trade_data","arguments":{"lawd_cd":"11680","deal_ymd":"202505"}}'
//! ```

use clap::Parser;
use ondol_rs::cache::sweep;
use ondol_rs::config::ServerConfig;
use ondol_rs::tools::{ServerContext, build_registry};
use ondol_web::{WebConfig, spawn_web};
use std::path::PathBuf;
use std::sync::Arc;

/// HTTP front-end for the ondol tool server.
#[derive(Parser)]
#[command(name = "ondol-web", version)]
struct Cli {
    /// Port to bind on localhost.
    #[arg(long, default_value_t = 3001)]
    port: u16,

    /// Cache directory. Defaults to ONDOL_CACHE_DIR, then the user cache dir.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Disable the background retention sweep.
    #[arg(long)]
    no_sweep: bool,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = ServerConfig::from_env();
    if let Some(dir) = cli.cache_dir {
        config.cache_dir = dir;
    }
    config.sweep_enabled = !cli.no_sweep;

    let sweep_enabled = config.sweep_enabled;
    let sweep_interval = config.sweep_interval;
    let max_retention = config.max_retention;

    let ctx = Arc::new(ServerContext::new(config)?);
    if sweep_enabled {
        sweep::spawn(ctx.store().clone(), sweep_interval, max_retention);
    }

    let registry = Arc::new(build_registry(ctx.clone()));
    let web_config = WebConfig {
        bind_addr: ([127, 0, 0, 1], cli.port).into(),
    };
    let addr = spawn_web(ctx.clone(), registry, web_config).await;
    tracing::info!("cache dir: {}", ctx.config.cache_dir.display());
    println!("ondol API: http://{addr}");

    // The server lives on a background task; park the main task.
    std::future::pending::<()>().await;
    Ok(())
}
