//! HTTP transport for the ondol tool server.
//!
//! `ondol-web` exposes the same [`ToolRegistry`](ondol_rs::tools::ToolRegistry)
//! the stdio transport serves, as a small REST API: list the tools, call one,
//! inspect the cache. Useful for dashboards, curl-driven debugging, and
//! clients that prefer HTTP over a stdio child process.
//!
//! # Quick start
//!
//! ```ignore
//! use ondol_rs::config::ServerConfig;
//! use ondol_rs::tools::{ServerContext, build_registry};
//! use ondol_web::{WebConfig, spawn_web};
//! use std::sync::Arc;
//!
//! let ctx = Arc::new(ServerContext::new(ServerConfig::from_env())?);
//! let registry = Arc::new(build_registry(ctx.clone()));
//! let addr = spawn_web(ctx, registry, WebConfig::default()).await;
//! println!("API: http://{addr}");
//! ```
//!
//! # Endpoints
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /api/health` | Liveness and version |
//! | `GET /api/tools` | Tool definitions with input schemas |
//! | `POST /api/call` | `{name, arguments}` to a result envelope |
//! | `GET /api/cache` | Cached artifact metadata, filterable |

mod api;
mod server;

pub use api::AppState;

use ondol_rs::tools::{ServerContext, ToolRegistry};
use std::net::SocketAddr;
use std::sync::Arc;

/// Configuration for the web server.
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:3001`.
    pub bind_addr: SocketAddr,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
        }
    }
}

/// Spawn the web server on a Tokio task and return the bound address.
///
/// The server runs until the Tokio runtime shuts down.
pub async fn spawn_web(
    ctx: Arc<ServerContext>,
    registry: Arc<ToolRegistry>,
    config: WebConfig,
) -> SocketAddr {
    let router = server::build_router(ctx, registry);
    server::start_server(router, config.bind_addr).await
}
