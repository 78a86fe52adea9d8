//! JSON-RPC request builders for the MCP methods the registry speaks.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{json, Value};

use super::types::JsonRpcRequest;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Protocol revision advertised when no override is configured.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2025-06-18";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// Global request ID counter.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique request ID.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Builders ────────────────────────────────────────────────────────────────

/// Identity sent as `clientInfo` during the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "agent-registry".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Build an `initialize` request.
///
/// Every capability key is present even though its body is empty: some
/// servers reject the handshake when a key is missing.
pub fn initialize_request(protocol_version: Option<&str>, client: &ClientInfo) -> JsonRpcRequest {
    let version = protocol_version
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_PROTOCOL_VERSION);

    let params = json!({
        "protocolVersion": version,
        "clientInfo": {
            "name": client.name,
            "version": client.version,
        },
        "capabilities": {
            "tools": {},
            "prompts": {},
            "resources": { "subscribe": true },
            "resourceTemplates": { "subscribe": true },
            "logging": {},
        },
    });

    JsonRpcRequest::new(next_request_id(), METHOD_INITIALIZE, Some(params))
}

/// Build a `tools/list` request with an empty params object.
pub fn tools_list_request() -> JsonRpcRequest {
    JsonRpcRequest::new(next_request_id(), METHOD_TOOLS_LIST, Some(json!({})))
}

/// Build a request for an arbitrary method. `null` params become `{}`.
pub fn call_request(method: &str, params: Value) -> JsonRpcRequest {
    let params = if params.is_null() { json!({}) } else { params };
    JsonRpcRequest::new(next_request_id(), method, Some(params))
}

/// Params for `tools/call`. Missing arguments are sent as `{}`.
pub fn tool_call_params(name: &str, arguments: Value) -> Value {
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    json!({ "name": name, "arguments": arguments })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
