//! REST API endpoint handlers.
//!
//! Tool invocation always answers 200 with a result envelope; the envelope's
//! own `status`/`stage` fields carry failure detail, matching what the stdio
//! transport reports. HTTP error codes are reserved for transport-level
//! problems (bad request body, store I/O).

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use ondol_rs::cache::ListFilter;
use ondol_rs::tools::{ServerContext, ToolRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared application state passed to all handlers via axum's `State`
/// extractor.
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<ServerContext>,
    pub registry: Arc<ToolRegistry>,
}

/// GET /api/health — liveness and version.
pub async fn get_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "server": ondol_rs::SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/tools — tool definitions with input schemas.
pub async fn get_tools(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "tools": app.registry.definitions() }))
}

/// Request body for POST /api/call.
#[derive(Deserialize)]
pub struct CallRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// POST /api/call — invoke a tool and return its result envelope.
pub async fn post_call(
    State(app): State<AppState>,
    Json(body): Json<CallRequest>,
) -> Json<ondol_rs::ToolResult> {
    let arguments = if body.arguments.is_null() {
        serde_json::json!({})
    } else {
        body.arguments
    };
    Json(app.registry.call(&body.name, arguments).await)
}

/// Query parameters for GET /api/cache.
#[derive(Deserialize, Default)]
pub struct CacheQuery {
    pub contains: Option<String>,
    pub tool: Option<String>,
    pub region: Option<String>,
    pub month: Option<String>,
}

/// One row of cache metadata (records themselves stay on disk).
#[derive(Serialize)]
pub struct CacheRow {
    pub key: String,
    pub fetched_at: String,
    pub record_count: usize,
    pub age_hours: u64,
}

/// GET /api/cache — cached artifact metadata, filterable.
pub async fn get_cache(
    State(app): State<AppState>,
    Query(query): Query<CacheQuery>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let filter = ListFilter {
        contains: query.contains,
        tool: query.tool,
        region: query.region,
        month: query.month,
    };
    let entries = app
        .ctx
        .store()
        .list(&filter)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e))?;

    let rows: Vec<CacheRow> = entries
        .iter()
        .map(|entry| CacheRow {
            key: entry.key.clone(),
            fetched_at: entry.fetched_at.to_rfc3339(),
            record_count: entry.records.len(),
            age_hours: app.ctx.store().age(entry).as_secs() / 3600,
        })
        .collect();
    Ok(Json(serde_json::json!({ "entries": rows })))
}
