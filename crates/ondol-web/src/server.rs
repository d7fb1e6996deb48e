//! Axum server setup and router construction.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use ondol_rs::tools::{ServerContext, ToolRegistry};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{self, AppState};

/// Build the full axum router.
pub fn build_router(ctx: Arc<ServerContext>, registry: Arc<ToolRegistry>) -> Router {
    let state = AppState { ctx, registry };

    // Permissive CORS: the API serves local dashboards and tooling.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(api::get_health))
        .route("/api/tools", get(api::get_tools))
        .route("/api/call", post(api::post_call))
        .route("/api/cache", get(api::get_cache))
        .with_state(state)
        .layer(cors)
}

/// Start the axum server and return the bound address.
pub async fn start_server(router: Router, bind_addr: SocketAddr) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind(bind_addr).await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    addr
}
