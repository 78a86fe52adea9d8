//! Agent discovery probe.
//!
//! One HTTP call built from the agent's discovery descriptor. The query
//! value goes in the query string and, for POST/PUT, in a JSON body under
//! the same key.

use std::time::{Duration, Instant};

use reqwest::header::ACCEPT;
use reqwest::{Client as HttpClient, Method, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::{AgentDiscovery, ProbeMethod, Protocol};
use crate::config::{AgentHealthConfig, ClientConfig};
use crate::mcp_client::client::normalize_bearer;
use crate::mcp_client::transport::{classify_reqwest_error, error_chain, truncate_body};
use crate::mcp_client::McpError;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Characters of the probe response kept in a report.
const SNIPPET_CHARS: usize = 1_200;

/// Query value used when a request does not provide one.
pub const DEFAULT_PROBE_QUERY: &str = "test";

// ─── Types ───────────────────────────────────────────────────────────────────

/// Raw outcome of a probe that produced an HTTP response.
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl ProbeResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// An operator's ad hoc endpoint test, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProbeRequest {
    pub protocol: String,
    pub endpoint: String,
    pub method: String,
    pub query_param: String,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl AgentProbeRequest {
    /// Validate into a canonical descriptor, or explain what is wrong.
    pub fn validate(&self) -> Result<AgentDiscovery, String> {
        let method = ProbeMethod::parse(&self.method)
            .ok_or_else(|| format!("method must be GET, POST or PUT (got '{}')", self.method.trim()))?;
        let protocol = Protocol::parse(&self.protocol)
            .ok_or_else(|| format!("protocol must be HTTP or HTTPS (got '{}')", self.protocol.trim()))?;
        if self.endpoint.trim().is_empty() {
            return Err("endpoint is required".into());
        }
        if self.query_param.trim().is_empty() {
            return Err("queryParam is required".into());
        }

        let discovery = AgentDiscovery {
            protocol,
            endpoint: self.endpoint.clone(),
            method,
            query_param: self.query_param.clone(),
        }
        .normalized();

        if discovery.endpoint.is_empty() {
            return Err("endpoint is required".into());
        }
        Ok(discovery)
    }
}

/// Result of an endpoint test, shaped for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentProbeReport {
    pub ok: bool,
    /// HTTP status; 400 for a rejected request, 0 when no response arrived.
    pub status: u16,
    pub latency_ms: u64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_snippet: Option<String>,
}

// ─── AgentProber ─────────────────────────────────────────────────────────────

/// HTTP client for agent discovery endpoints.
#[derive(Debug, Clone)]
pub struct AgentProber {
    http: HttpClient,
}

impl AgentProber {
    pub fn new(
        connect_timeout: Duration,
        timeout: Duration,
        accept_invalid_certs: bool,
    ) -> Result<Self, McpError> {
        let http = HttpClient::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| McpError::Configuration {
                reason: format!("failed to build probe HTTP client: {e}"),
            })?;
        Ok(Self { http })
    }

    pub fn from_config(client: &ClientConfig, agents: &AgentHealthConfig) -> Result<Self, McpError> {
        Self::new(
            client.connect_timeout(),
            Duration::from_millis(agents.probe_timeout_ms),
            agents.accept_invalid_certs,
        )
    }

    /// Issue the probe. Any HTTP response is `Ok`, whatever its status.
    pub async fn probe(
        &self,
        discovery: &AgentDiscovery,
        query_value: &str,
        bearer_token: Option<&str>,
    ) -> Result<ProbeResponse, McpError> {
        let url = probe_url(discovery, query_value)?;
        let url_text = url.to_string();

        let method = match discovery.method {
            ProbeMethod::Get => Method::GET,
            ProbeMethod::Post => Method::POST,
            ProbeMethod::Put => Method::PUT,
        };

        let mut request = self
            .http
            .request(method, url)
            .header(ACCEPT, "application/json");
        if discovery.method.has_body() {
            let mut body = Map::new();
            body.insert(discovery.query_param.clone(), Value::String(query_value.to_string()));
            request = request.json(&body);
        }
        if let Some(bearer) = normalize_bearer(bearer_token) {
            request = request.bearer_auth(bearer);
        }

        let to_error = |e: reqwest::Error| McpError::Transport {
            url: url_text.clone(),
            failure: classify_reqwest_error(&e),
            reason: error_chain(&e),
        };

        let response = request.send().await.map_err(to_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(to_error)?;

        Ok(ProbeResponse {
            url: url_text.clone(),
            status,
            body,
        })
    }

    /// Validate and run an operator endpoint test. Never fails; problems
    /// are reported in the returned value.
    pub async fn test_endpoint(&self, request: &AgentProbeRequest) -> AgentProbeReport {
        let discovery = match request.validate() {
            Ok(d) => d,
            Err(message) => {
                return AgentProbeReport {
                    ok: false,
                    status: 400,
                    latency_ms: 0,
                    message,
                    response_snippet: None,
                }
            }
        };

        let query = request
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or(DEFAULT_PROBE_QUERY);

        let start = Instant::now();
        let outcome = self
            .probe(&discovery, query, request.bearer_token.as_deref())
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(response) => AgentProbeReport {
                ok: response.is_success(),
                status: response.status,
                latency_ms,
                message: if response.is_success() {
                    "Endpoint reachable".to_string()
                } else {
                    format!("Endpoint returned HTTP {}", response.status)
                },
                response_snippet: Some(truncate_body(&response.body, SNIPPET_CHARS)),
            },
            Err(e) => AgentProbeReport {
                ok: false,
                status: 0,
                latency_ms,
                message: e.friendly_message(),
                response_snippet: None,
            },
        }
    }
}

/// `{protocol}://{endpoint}` with `query_param=value` appended.
pub fn probe_url(discovery: &AgentDiscovery, query_value: &str) -> Result<Url, McpError> {
    let base = format!("{}://{}", discovery.protocol.scheme(), discovery.endpoint);
    let mut url = Url::parse(&base).map_err(|e| McpError::Configuration {
        reason: format!("invalid agent endpoint '{base}': {e}"),
    })?;
    url.query_pairs_mut()
        .append_pair(&discovery.query_param, query_value);
    Ok(url)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
