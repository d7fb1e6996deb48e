//! Tool registration and dispatch.
//!
//! The registry is the single seam between the transports and the tool
//! implementations: both the stdio loop and the HTTP API hand it a tool
//! name plus a JSON argument object and get a [`ToolResult`] back. Incoming
//! arguments are validated against the tool's published JSON Schema before
//! the handler runs, so handlers see well-shaped input and the client gets
//! a correctable error message instead of a handler-level surprise.

use super::ServerContext;
use crate::{Stage, ToolDef, ToolResult};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info};

/// Boxed future returned by tool handlers.
pub type ToolResultFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;

/// Type-erased async tool handler.
pub type ToolHandler =
    Box<dyn Fn(Arc<ServerContext>, serde_json::Value) -> ToolResultFuture + Send + Sync>;

struct ToolEntry {
    def: ToolDef,
    handler: ToolHandler,
}

/// Name-keyed tool table with schema-validated dispatch.
pub struct ToolRegistry {
    ctx: Arc<ServerContext>,
    // BTreeMap keeps `tools/list` output stable across runs.
    tools: BTreeMap<String, ToolEntry>,
}

impl ToolRegistry {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Self {
            ctx,
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register<F, Fut>(&mut self, def: ToolDef, handler: F)
    where
        F: Fn(Arc<ServerContext>, serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        let name = def.name.clone();
        let erased: ToolHandler = Box::new(move |ctx, args| Box::pin(handler(ctx, args)));
        self.tools.insert(
            name,
            ToolEntry {
                def,
                handler: erased,
            },
        );
    }

    /// All tool definitions, name-ordered.
    pub fn definitions(&self) -> Vec<ToolDef> {
        self.tools.values().map(|t| t.def.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Dispatch a tool call.
    ///
    /// Unknown names and schema violations come back as error envelopes;
    /// this method never panics and never returns a raw error.
    pub async fn call(&self, name: &str, arguments: serde_json::Value) -> ToolResult {
        let Some(entry) = self.tools.get(name) else {
            return ToolResult::error(
                Stage::KeyDerivation,
                format!("unknown tool '{name}'"),
            );
        };

        if let Some(error) = validate_arguments(&entry.def, &arguments) {
            return ToolResult::error(Stage::KeyDerivation, error);
        }

        log_tool_call(name, &arguments);
        let start = std::time::Instant::now();
        let result = (entry.handler)(self.ctx.clone(), arguments).await;
        debug!(
            "tool {name} finished in {:.0}ms (status {:?})",
            start.elapsed().as_secs_f64() * 1000.0,
            result.status,
        );
        result
    }
}

/// Validate a call's arguments against the tool's declared schema.
///
/// Returns `None` when valid, or a message the caller can act on. A schema
/// that itself fails to compile skips validation rather than blocking the
/// tool.
fn validate_arguments(def: &ToolDef, arguments: &serde_json::Value) -> Option<String> {
    let validator = match jsonschema::validator_for(&def.input_schema) {
        Ok(v) => v,
        Err(_) => return None,
    };
    let errors: Vec<String> = validator
        .iter_errors(arguments)
        .map(|e| format!("  - {}: {e}", e.instance_path()))
        .collect();
    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "argument validation failed for tool '{}':\n{}",
            def.name,
            errors.join("\n")
        ))
    }
}

/// Log a tool call at INFO with a truncated argument preview.
fn log_tool_call(name: &str, arguments: &serde_json::Value) {
    let raw = arguments.to_string();
    let preview: String = raw.chars().take(120).collect();
    info!(
        "[tool] {name}({preview}{})",
        if raw.len() > 120 { "..." } else { "" }
    );
}

/// Convert a typed argument struct into the string parameter map the key
/// deriver and upstreams consume. Skips nulls; numbers lose no precision
/// (they arrive as integers).
pub fn params_from<T: serde::Serialize>(args: &T) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    if let Ok(serde_json::Value::Object(map)) = serde_json::to_value(args) {
        for (name, value) in map {
            match value {
                serde_json::Value::String(s) => {
                    params.insert(name, s);
                }
                serde_json::Value::Number(n) => {
                    params.insert(name, n.to_string());
                }
                serde_json::Value::Bool(b) => {
                    params.insert(name, b.to_string());
                }
                _ => {}
            }
        }
    }
    params
}
