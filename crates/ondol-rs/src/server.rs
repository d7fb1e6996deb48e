//! stdio JSON-RPC 2.0 transport implementing the MCP server handshake.
//!
//! One request per line on stdin, one response per line on stdout; logs go
//! to stderr so the protocol channel stays clean. The loop survives
//! anything a client sends: parse failures and unknown methods become
//! JSON-RPC error objects, tool failures become result envelopes with
//! `isError`, and only EOF ends the session.

use crate::tools::ToolRegistry;
use crate::{PROTOCOL_VERSION, SERVER_NAME, ToolResult};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

#[derive(Deserialize, Debug)]
struct Request {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

/// Serve the registry over stdin/stdout until EOF.
pub async fn run_stdio(registry: Arc<ToolRegistry>) -> Result<(), String> {
    info!(
        "{SERVER_NAME} listening on stdio ({} tools, protocol {PROTOCOL_VERSION})",
        registry.len(),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| format!("stdin read failed: {e}"))?
    {
        if line.trim().is_empty() {
            continue;
        }
        let Some(response) = handle_line(&registry, &line).await else {
            continue; // Notification: nothing to send back.
        };
        let mut body = response.to_string();
        body.push('\n');
        stdout
            .write_all(body.as_bytes())
            .await
            .map_err(|e| format!("stdout write failed: {e}"))?;
        stdout
            .flush()
            .await
            .map_err(|e| format!("stdout flush failed: {e}"))?;
    }

    info!("stdin closed, shutting down");
    Ok(())
}

/// Handle one raw request line. `None` means "send nothing" (notification).
async fn handle_line(registry: &ToolRegistry, line: &str) -> Option<Value> {
    let request: Request = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            warn!("unparsable request: {e}");
            return Some(error_response(Value::Null, PARSE_ERROR, &format!("parse error: {e}")));
        }
    };

    debug!("request: method={} id={:?}", request.method, request.id);

    // Notifications carry no id and get no response.
    let Some(id) = request.id else {
        if request.method != "notifications/initialized" {
            debug!("ignoring notification {}", request.method);
        }
        return None;
    };

    let response = match request.method.as_str() {
        "initialize" => ok_response(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        ),
        "ping" => ok_response(id, json!({})),
        "tools/list" => ok_response(id, json!({ "tools": registry.definitions() })),
        "tools/call" => {
            let name = request.params.get("name").and_then(|n| n.as_str());
            let Some(name) = name else {
                return Some(error_response(
                    id,
                    INVALID_PARAMS,
                    "tools/call requires a 'name' parameter",
                ));
            };
            let arguments = request
                .params
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));
            let result = registry.call(name, arguments).await;
            ok_response(id, tool_result_content(&result))
        }
        other => error_response(id, METHOD_NOT_FOUND, &format!("unknown method '{other}'")),
    };
    Some(response)
}

/// Map a [`ToolResult`] to MCP `tools/call` content blocks.
///
/// The first text block is the envelope text (artifact path or message),
/// annotated when served from stale cache; the preview, when present,
/// follows as a pretty-printed JSON block.
fn tool_result_content(result: &ToolResult) -> Value {
    let mut text = result.text.clone();
    if result.served_stale {
        text.push_str("\n[served from stale cache: upstream refresh failed]");
    }
    if let Some(stage) = result.stage {
        text = format!("{text}\n[failed during {stage}]");
    }

    let mut content = vec![json!({ "type": "text", "text": text })];
    if let Some(preview) = &result.preview {
        let pretty =
            serde_json::to_string_pretty(preview).unwrap_or_else(|_| preview.to_string());
        content.push(json!({ "type": "text", "text": pretty }));
    }

    json!({
        "content": content,
        "isError": !result.is_success(),
    })
}

fn ok_response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}
