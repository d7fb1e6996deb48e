//! Korean public real-estate data tool server.
//!
//! `ondol-rs` exposes the Korean government's open data APIs (MOLIT actual
//! transaction prices, Bank of Korea ECOS statistics, legal district codes)
//! as a set of callable tools behind a disk cache. Every collection tool
//! routes through one [`Coordinator`](cache::Coordinator): check the cache,
//! call upstream on a miss or stale entry, persist the result, and fall back
//! to the stale copy when upstream is down. Tools are served to an AI
//! assistant over stdio JSON-RPC (the MCP handshake) or, via the companion
//! `ondol-web` crate, over HTTP.
//!
//! # Getting started
//!
//! ```sh
//! export PUBLIC_DATA_API_KEY=...   # data.go.kr service key
//! export ECOS_API_KEY=...          # ecos.bok.or.kr key
//! ondol --cache-dir ~/.cache/ondol
//! ```
//!
//! # Where to find things
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Cache key derivation, the on-disk store, the fetch-or-serve [`Coordinator`](cache::Coordinator), and the retention sweep |
//! | [`upstream`] | HTTP clients for MOLIT RTMS, ECOS, and the district-code API, plus the [`FetchError`](upstream::FetchError) taxonomy |
//! | [`tools`] | [`ToolRegistry`](tools::ToolRegistry) and every registered tool: collection, indicators, region lookup, analysis, cache inspection |
//! | [`stats`] | Lenient numeric parsing and grouped transaction summaries |
//! | [`server`] | The stdio JSON-RPC loop |
//! | [`config`] | [`ServerConfig`](config::ServerConfig): keys, cache directory, freshness and retry knobs |
//!
//! # Design principles
//!
//! 1. **One coordinator, many endpoints.** The upstream APIs are dozens of
//!    near-identical endpoints. The fetch/cache/fallback algorithm exists
//!    exactly once; endpoints are rows in a table.
//! 2. **Stale beats nothing.** Public data portals have outages and rate
//!    limits. An expired artifact is still served (flagged) when a refresh
//!    fails, so the assistant degrades instead of erroring.
//! 3. **Every exit is an envelope.** Tool handlers never panic across the
//!    transport and never return raw errors; each path produces a
//!    [`ToolResult`] with a status, a stage on failure, and a small preview.

pub mod cache;
pub mod config;
pub mod server;
pub mod stats;
pub mod tools;
pub mod upstream;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ── Constants ──────────────────────────────────────────────────────

/// Number of records included in a result preview.
pub const PREVIEW_RECORDS: usize = 5;

/// Server name reported in the MCP `initialize` handshake.
pub const SERVER_NAME: &str = "ondol";

/// Protocol revision implemented by the stdio transport.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

// ── Records ────────────────────────────────────────────────────────

/// One upstream record: field name to value, untyped as received.
///
/// Transaction rows, statistic rows, and district-code rows all share this
/// shape; no schema is enforced beyond what upstream provides.
pub type Record = serde_json::Map<String, serde_json::Value>;

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`. This is the bridge between typed argument structs
/// and the schema published in `tools/list` (and enforced on `tools/call`).
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Tool definitions ───────────────────────────────────────────────

/// A tool definition as published to the client in `tools/list`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

impl ToolDef {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

// ── Result envelope ────────────────────────────────────────────────

/// Outcome status of a tool invocation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
}

/// The pipeline stage at which a tool invocation failed.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    KeyDerivation,
    CacheRead,
    UpstreamFetch,
    Persist,
    Analysis,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::KeyDerivation => write!(f, "key-derivation"),
            Stage::CacheRead => write!(f, "cache-read"),
            Stage::UpstreamFetch => write!(f, "upstream-fetch"),
            Stage::Persist => write!(f, "persist"),
            Stage::Analysis => write!(f, "analysis"),
        }
    }
}

/// The uniform envelope every tool returns.
///
/// `text` is either an absolute path to a persisted artifact or a short
/// inline message; large payloads are loaded by path, never inlined.
/// `preview` is a small sample for interactive inspection. `served_stale`
/// marks a success that was satisfied from an expired cache entry after a
/// failed refresh.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolResult {
    pub status: ToolStatus,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub served_stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
}

impl ToolResult {
    /// A plain success with an inline message or artifact path.
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Success,
            text: text.into(),
            preview: None,
            served_stale: false,
            stage: None,
        }
    }

    /// A success carrying a preview sample.
    pub fn success_with_preview(text: impl Into<String>, preview: serde_json::Value) -> Self {
        Self {
            preview: Some(preview),
            ..Self::success(text)
        }
    }

    /// A success served from an expired cache entry after a failed refresh.
    pub fn degraded(text: impl Into<String>, preview: Option<serde_json::Value>) -> Self {
        Self {
            preview,
            served_stale: true,
            ..Self::success(text)
        }
    }

    /// An error envelope naming the failing stage.
    pub fn error(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            text: message.into(),
            preview: None,
            served_stale: false,
            stage: Some(stage),
        }
    }

    /// Whether this envelope reports success (fresh or degraded).
    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

/// Build a preview value from the first [`PREVIEW_RECORDS`] records.
///
/// Returns `None` for an empty record set so empty results stay compact.
pub fn preview_of(records: &[Record]) -> Option<serde_json::Value> {
    if records.is_empty() {
        return None;
    }
    let sample: Vec<serde_json::Value> = records
        .iter()
        .take(PREVIEW_RECORDS)
        .cloned()
        .map(serde_json::Value::Object)
        .collect();
    Some(serde_json::Value::Array(sample))
}
