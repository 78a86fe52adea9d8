//! Shared types for the MCP client.
//!
//! JSON-RPC 2.0 message types, the transient protocol session, and the
//! canonical tool definition produced by the normalizer.

use serde::{Deserialize, Serialize};

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response message (success or error).
///
/// Remote servers are not under our control, so `id` is kept as a raw
/// value (some echo it back as a string) and every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// How a response body is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    Json,
    EventStream,
}

/// A decoded 2xx response from the transport.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub raw_body: String,
    /// Value of the `mcp-session-id` response header, if any.
    pub session_token: Option<String>,
    /// The JSON document (the last `data:` frame for event streams).
    pub json: serde_json::Value,
}

// ─── MCP Protocol Types ──────────────────────────────────────────────────────

/// A negotiated protocol session.
///
/// Only `McpClient::initialize` produces one, so holding a session means
/// the handshake succeeded. Never persisted and never reused across
/// reconciler ticks.
#[derive(Debug, Clone)]
pub struct McpSession {
    /// The URL that answered the handshake (after scheme fallback).
    pub resolved_url: String,
    /// Session token from the header or the handshake result.
    pub session_id: Option<String>,
    /// Raw `initialize` result.
    pub initialize_result: serde_json::Value,
}

/// Canonical tool definition, independent of the upstream field naming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

// ─── Standard MCP Error Codes ────────────────────────────────────────────────

/// Well-known JSON-RPC error codes.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// The JSON sent is not a valid Request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

// ─── Tests ───────────────────────────────────────────────────────────────────
