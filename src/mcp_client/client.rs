//! MCP protocol client.
//!
//! Handshake with scheme fallback, session-scoped calls, and sessionless
//! calls straight against a discovery URL (health probes, tool pass-through).
//! Holding an [`McpSession`] is the proof that the handshake succeeded.

use std::time::{Duration, Instant};

use serde_json::{json, Value};

use super::document::{Document, SESSION_ID_PATHS};
use super::envelope::{self, ClientInfo, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST};
use super::errors::McpError;
use super::normalizer::normalize;
use super::transport::{truncate_body, HttpTransport, RequestOptions, DEFAULT_EXCERPT_CHARS};
use super::types::{JsonRpcRequest, JsonRpcResponse, McpSession, ToolDefinition, TransportResponse};
use crate::config::ClientConfig;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Body excerpt kept when a tool invocation fails.
const INVOKE_EXCERPT_CHARS: usize = 800;

// ─── McpClient ───────────────────────────────────────────────────────────────

/// Client for remote MCP tool servers over HTTP.
#[derive(Debug, Clone)]
pub struct McpClient {
    transport: HttpTransport,
    protocol_version: String,
    client_info: ClientInfo,
    invoke_timeout: Duration,
}

impl McpClient {
    /// Create a client from configuration. Does not touch the network.
    pub fn new(config: &ClientConfig) -> Result<Self, McpError> {
        let transport = HttpTransport::new(config.connect_timeout(), config.request_timeout())?;
        Ok(Self {
            transport,
            protocol_version: config.protocol_version.clone(),
            client_info: ClientInfo {
                name: config.client_name.clone(),
                version: config.client_version.clone(),
            },
            invoke_timeout: config.invoke_timeout(),
        })
    }

    // ─── Handshake ───────────────────────────────────────────────────────

    /// Run `initialize` against the discovery URL.
    ///
    /// The normalized URL is tried first, then the same URL with the other
    /// scheme. The first success wins. When both fail the error lists the
    /// attempted URLs and the last failure's friendly message.
    pub async fn initialize(&self, discovery_url: &str) -> Result<McpSession, McpError> {
        let normalized = normalize_discovery_url(discovery_url)?;
        let candidates = scheme_candidates(&normalized);
        let mut last_error: Option<McpError> = None;

        for candidate in &candidates {
            let start = Instant::now();
            match self.handshake(candidate).await {
                Ok(session) => {
                    tracing::info!(
                        url = %candidate,
                        session = session.session_id.is_some(),
                        latency_ms = start.elapsed().as_millis() as u64,
                        "MCP handshake succeeded"
                    );
                    return Ok(session);
                }
                Err(e) => {
                    tracing::warn!(url = %candidate, error = %e, "MCP handshake attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(McpError::ConnectExhausted {
            attempted: candidates,
            last_error: last_error
                .map(|e| e.friendly_message())
                .unwrap_or_default(),
        })
    }

    async fn handshake(&self, url: &str) -> Result<McpSession, McpError> {
        let request = envelope::initialize_request(Some(&self.protocol_version), &self.client_info);
        let response = self
            .transport
            .send(url, &request, &RequestOptions::default())
            .await?;
        let result = extract_result(&response, &request.method, DEFAULT_EXCERPT_CHARS)?;

        let session_id = response
            .session_token
            .clone()
            .or_else(|| Document::new(&result).first_string(SESSION_ID_PATHS));

        Ok(McpSession {
            resolved_url: url.to_string(),
            session_id,
            initialize_result: result,
        })
    }

    // ─── Session calls ───────────────────────────────────────────────────

    /// List the server's tools on an established session.
    pub async fn list_tools(&self, session: &McpSession) -> Result<Vec<ToolDefinition>, McpError> {
        let result = self.call(session, METHOD_TOOLS_LIST, json!({})).await?;
        Ok(normalize(&result))
    }

    /// Call any method on an established session and return its `result`.
    pub async fn call(&self, session: &McpSession, method: &str, params: Value) -> Result<Value, McpError> {
        let request = build_call(method, params)?;
        let options = RequestOptions {
            session_token: session.session_id.as_deref(),
            ..Default::default()
        };
        let response = self
            .transport
            .send(&session.resolved_url, &request, &options)
            .await?;
        extract_result(&response, method, DEFAULT_EXCERPT_CHARS)
    }

    // ─── Sessionless calls ───────────────────────────────────────────────

    /// Call a method directly against a discovery URL without a handshake.
    pub async fn call_url(
        &self,
        discovery_url: &str,
        method: &str,
        params: Value,
        bearer_token: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Value, McpError> {
        let url = normalize_discovery_url(discovery_url)?;
        let request = build_call(method, params)?;
        let bearer = normalize_bearer(bearer_token);
        let options = RequestOptions {
            bearer_token: bearer.as_deref(),
            timeout,
            excerpt_chars: INVOKE_EXCERPT_CHARS,
            ..Default::default()
        };
        let response = self.transport.send(&url, &request, &options).await?;
        extract_result(&response, method, INVOKE_EXCERPT_CHARS)
    }

    /// Liveness probe: stateless `tools/list`, normalized.
    pub async fn probe_tools(&self, discovery_url: &str) -> Result<Vec<ToolDefinition>, McpError> {
        let result = self
            .call_url(discovery_url, METHOD_TOOLS_LIST, json!({}), None, None)
            .await?;
        Ok(normalize(&result))
    }

    /// Pass a `tools/call` through to the server.
    ///
    /// `bearer_token` may be given with or without the `Bearer ` prefix.
    /// `timeout` defaults to the configured invoke timeout.
    pub async fn invoke_tool(
        &self,
        discovery_url: &str,
        tool_name: &str,
        arguments: Value,
        bearer_token: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Value, McpError> {
        if tool_name.trim().is_empty() {
            return Err(McpError::Configuration {
                reason: "tool name is required".into(),
            });
        }
        let params = envelope::tool_call_params(tool_name, arguments);
        self.call_url(
            discovery_url,
            METHOD_TOOLS_CALL,
            params,
            bearer_token,
            Some(timeout.unwrap_or(self.invoke_timeout)),
        )
        .await
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn build_call(method: &str, params: Value) -> Result<JsonRpcRequest, McpError> {
    let method = method.trim();
    if method.is_empty() {
        return Err(McpError::Configuration {
            reason: "method is required".into(),
        });
    }
    Ok(envelope::call_request(method, params))
}

/// Pull `result` out of a decoded response.
///
/// An `error` object becomes [`McpError::ServerError`]. A missing or null
/// `result` is a protocol error quoting the raw body.
pub fn extract_result(
    response: &TransportResponse,
    method: &str,
    excerpt_chars: usize,
) -> Result<Value, McpError> {
    let envelope: JsonRpcResponse =
        serde_json::from_value(response.json.clone()).map_err(|e| McpError::Protocol {
            reason: format!(
                "malformed JSON-RPC response to {method} ({e}): {}",
                truncate_body(&response.raw_body, excerpt_chars)
            ),
        })?;

    if let Some(err) = envelope.error {
        return Err(McpError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    envelope.result.ok_or_else(|| McpError::Protocol {
        reason: format!(
            "{method} response carried no result: {}",
            truncate_body(&response.raw_body, excerpt_chars)
        ),
    })
}

/// Trim, drop trailing slashes and require an `http`/`https` scheme.
pub fn normalize_discovery_url(raw: &str) -> Result<String, McpError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(McpError::Configuration {
            reason: "discovery URL is required".into(),
        });
    }
    let url = trimmed.trim_end_matches('/');
    let lower = url.to_ascii_lowercase();
    let has_host = |prefix: &str| lower.starts_with(prefix) && lower.len() > prefix.len();
    if !has_host("http://") && !has_host("https://") {
        return Err(McpError::Configuration {
            reason: format!("discovery URL must use http or https: {trimmed}"),
        });
    }
    Ok(url.to_string())
}

/// The URL itself, then the same URL with the opposite scheme.
pub fn scheme_candidates(url: &str) -> Vec<String> {
    let lower = url.to_ascii_lowercase();
    let alternate = if lower.starts_with("https://") {
        format!("http://{}", &url["https://".len()..])
    } else if lower.starts_with("http://") {
        format!("https://{}", &url["http://".len()..])
    } else {
        return vec![url.to_string()];
    };
    vec![url.to_string(), alternate]
}

/// Trim a bearer token and strip a case-insensitive `Bearer ` prefix.
pub fn normalize_bearer(raw: Option<&str>) -> Option<String> {
    let token = raw?.trim();
    let token = match token.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => token[7..].trim(),
        _ => token,
    };
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
