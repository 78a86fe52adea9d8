//! JSON-RPC over HTTP POST (MCP streamable HTTP).
//!
//! One request per call. The response body is either plain JSON or a
//! complete `text/event-stream` body; both are reduced to one JSON document
//! before the client sees them.

use std::time::Duration;

use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::Client as HttpClient;
use serde_json::Value;

use super::errors::{McpError, TransportFailure};
use super::sse;
use super::types::{BodyFraming, JsonRpcRequest, TransportResponse};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Header carrying the session token in both directions.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Accept header advertising both response framings.
const ACCEPT_JSON_OR_STREAM: &str = "application/json, text/event-stream";

/// Characters of a failing body kept for diagnostics.
pub const DEFAULT_EXCERPT_CHARS: usize = 500;

/// Markers found in resolver errors anywhere in a reqwest error chain.
const DNS_MARKERS: &[&str] = &[
    "dns error",
    "failed to lookup address",
    "name or service not known",
    "no such host",
    "nodename nor servname",
];

// ─── Transport ───────────────────────────────────────────────────────────────

/// Per-call knobs for [`HttpTransport::send`].
#[derive(Debug, Clone, Copy)]
pub struct RequestOptions<'a> {
    pub session_token: Option<&'a str>,
    pub bearer_token: Option<&'a str>,
    /// Overrides the client-wide request timeout.
    pub timeout: Option<Duration>,
    pub excerpt_chars: usize,
}

impl Default for RequestOptions<'_> {
    fn default() -> Self {
        Self {
            session_token: None,
            bearer_token: None,
            timeout: None,
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
        }
    }
}

/// HTTP transport shared by every MCP call.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: HttpClient,
}

impl HttpTransport {
    /// Build a transport with the given connect and total request timeouts.
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self, McpError> {
        let http = HttpClient::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| McpError::Configuration {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { http })
    }

    /// POST a JSON-RPC request and decode the response.
    ///
    /// Non-2xx statuses fail with [`McpError::HttpStatus`] carrying a body
    /// excerpt. A 2xx body that yields no JSON document is a protocol error.
    pub async fn send(
        &self,
        url: &str,
        payload: &JsonRpcRequest,
        options: &RequestOptions<'_>,
    ) -> Result<TransportResponse, McpError> {
        let mut request = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, ACCEPT_JSON_OR_STREAM)
            .header(CACHE_CONTROL, "no-cache")
            .json(payload);

        if let Some(token) = options.session_token {
            request = request.header(SESSION_HEADER, token);
        }
        if let Some(bearer) = options.bearer_token {
            request = request.bearer_auth(bearer);
        }
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }

        tracing::debug!(url = %url, method = %payload.method, id = payload.id, "sending MCP request");

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(url, &e))?;

        let status = response.status();
        let session_token = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let raw_body = response
            .text()
            .await
            .map_err(|e| transport_error(url, &e))?;

        if !status.is_success() {
            return Err(McpError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
                body: truncate_body(&raw_body, options.excerpt_chars),
            });
        }

        let json = decode_body(content_type.as_deref(), &raw_body, options.excerpt_chars)?;

        Ok(TransportResponse {
            status: status.as_u16(),
            raw_body,
            session_token,
            json,
        })
    }
}

// ─── Body decoding ───────────────────────────────────────────────────────────

/// Decide how a response body is framed.
///
/// The content type wins when it says `text/event-stream`; otherwise the
/// body prefix is checked because some servers mislabel the stream.
pub fn classify_transport(content_type: Option<&str>, body: &str) -> BodyFraming {
    let declared_stream = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("text/event-stream"))
        .unwrap_or(false);
    if declared_stream || sse::looks_like_event_stream(body) {
        BodyFraming::EventStream
    } else {
        BodyFraming::Json
    }
}

fn decode_body(content_type: Option<&str>, body: &str, excerpt_chars: usize) -> Result<Value, McpError> {
    match classify_transport(content_type, body) {
        BodyFraming::EventStream => sse::extract_json(body).ok_or_else(|| McpError::Protocol {
            reason: format!(
                "event-stream response carried no JSON payload: {}",
                truncate_body(body, excerpt_chars)
            ),
        }),
        BodyFraming::Json => {
            if body.trim().is_empty() {
                return Err(McpError::Protocol {
                    reason: "empty response body".into(),
                });
            }
            serde_json::from_str(body).map_err(|e| McpError::Protocol {
                reason: format!("invalid JSON response ({e}): {}", truncate_body(body, excerpt_chars)),
            })
        }
    }
}

/// Keep the first `max_chars` characters, marking the cut with `...`.
pub fn truncate_body(body: &str, max_chars: usize) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

// ─── Error classification ────────────────────────────────────────────────────

fn transport_error(url: &str, err: &reqwest::Error) -> McpError {
    McpError::Transport {
        url: url.to_string(),
        failure: classify_reqwest_error(err),
        reason: error_chain(err),
    }
}

/// Classify a reqwest failure as DNS, connect, timeout or other.
pub fn classify_reqwest_error(err: &reqwest::Error) -> TransportFailure {
    if err.is_timeout() {
        return TransportFailure::Timeout;
    }
    let chain = error_chain(err).to_ascii_lowercase();
    if DNS_MARKERS.iter().any(|m| chain.contains(m)) {
        TransportFailure::Dns
    } else if err.is_connect() {
        TransportFailure::Connect
    } else {
        TransportFailure::Other
    }
}

/// Display text of an error and all of its sources, joined by `: `.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}

// ─── Tests ───────────────────────────────────────────────────────────────────
