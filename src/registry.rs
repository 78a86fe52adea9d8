//! Operator-facing registry operations.
//!
//! Thin layer over the catalog, the MCP client and the agent prober:
//! - ad hoc connection tests against a discovery URL
//! - on-demand refresh of one tool server
//! - pass-through tool invocation with a dry-run mode
//! - ad hoc agent endpoint tests

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::{CatalogError, CatalogStore, ToolServerRecord};
use crate::config::RegistryConfig;
use crate::mcp_client::client::normalize_bearer;
use crate::mcp_client::{safe_message, McpClient, McpError, ToolDefinition};
use crate::reconciler::{AgentProbeReport, AgentProbeRequest, AgentProber, ServerHealthJob};

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Mcp(#[from] McpError),

    #[error("Tool '{tool_name}' is not registered on server {server_id}")]
    UnknownTool { server_id: String, tool_name: String },
}

// ─── Types ───────────────────────────────────────────────────────────────────

/// Result of [`Registry::test_connection`].
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionReport {
    pub resolved_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub latency_ms: u64,
    /// Raw `initialize` result.
    pub metadata: Value,
    pub tools: Vec<ToolDefinition>,
}

/// A request to call one tool on a registered server.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvokeRequest {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub dry_run: bool,
}

/// What a dry run would have sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DryRunPreview {
    pub tool_name: String,
    pub discovery_url: String,
    pub arguments: Value,
    pub has_bearer_token: bool,
}

/// Outcome of a real invocation. Remote failures land in `error`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInvokeOutcome {
    pub server_id: String,
    pub tool_name: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ToolInvocation {
    DryRun(DryRunPreview),
    Completed(ToolInvokeOutcome),
}

// ─── Registry ────────────────────────────────────────────────────────────────

pub struct Registry<S> {
    store: S,
    client: McpClient,
    server_health: ServerHealthJob<S>,
    prober: AgentProber,
}

impl<S: CatalogStore + Clone> Registry<S> {
    pub fn new(store: S, client: McpClient, prober: AgentProber, config: &RegistryConfig) -> Self {
        Self {
            server_health: ServerHealthJob::new(store.clone(), client.clone(), &config.server_health),
            store,
            client,
            prober,
        }
    }

    /// Handshake with scheme fallback, then list tools on the new session.
    pub async fn test_connection(&self, discovery_url: &str) -> Result<ConnectionReport, RegistryError> {
        let start = Instant::now();
        let session = self.client.initialize(discovery_url).await?;
        let tools = self.client.list_tools(&session).await?;
        let latency_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            url = %session.resolved_url,
            tools = tools.len(),
            latency_ms,
            "connection test succeeded"
        );

        Ok(ConnectionReport {
            resolved_url: session.resolved_url,
            session_id: session.session_id,
            latency_ms,
            metadata: session.initialize_result,
            tools,
        })
    }

    /// Run the server health check for one server right now.
    pub async fn refresh_server_now(&self, server_id: &str) -> Result<ToolServerRecord, RegistryError> {
        let server = self.require_server(server_id)?;
        tracing::info!(server_id, "refreshing tool server on demand");
        Ok(self.server_health.check_server(server).await)
    }

    /// The persisted tool list of one server.
    pub fn server_tools(&self, server_id: &str) -> Result<Vec<ToolDefinition>, RegistryError> {
        Ok(self.require_server(server_id)?.stored_tools())
    }

    /// Call a tool on a registered server, or preview the call.
    ///
    /// Unknown servers and tools are errors; anything that goes wrong on the
    /// remote side is reported in the outcome.
    pub async fn invoke_tool(
        &self,
        server_id: &str,
        request: &ToolInvokeRequest,
    ) -> Result<ToolInvocation, RegistryError> {
        let server = self.require_server(server_id)?;
        let tool_name = resolve_tool_name(&server.stored_tools(), &request.tool_name).ok_or_else(|| {
            RegistryError::UnknownTool {
                server_id: server_id.to_string(),
                tool_name: request.tool_name.trim().to_string(),
            }
        })?;
        let arguments = match &request.arguments {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        let bearer = normalize_bearer(request.bearer_token.as_deref());

        if request.dry_run {
            return Ok(ToolInvocation::DryRun(DryRunPreview {
                tool_name,
                discovery_url: server.discovery_url,
                arguments,
                has_bearer_token: bearer.is_some(),
            }));
        }

        let start = Instant::now();
        let outcome = self
            .client
            .invoke_tool(
                &server.discovery_url,
                &tool_name,
                arguments,
                bearer.as_deref(),
                request.timeout_ms.map(Duration::from_millis),
            )
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let (ok, result, error) = match outcome {
            Ok(result) => (true, Some(result), None),
            Err(e) => {
                tracing::warn!(server_id, tool = %tool_name, error = %e, "tool invocation failed");
                (false, None, Some(safe_message(&e)))
            }
        };

        Ok(ToolInvocation::Completed(ToolInvokeOutcome {
            server_id: server_id.to_string(),
            tool_name,
            ok,
            result,
            error,
            latency_ms,
        }))
    }

    /// Validate and probe an agent endpoint that is not necessarily
    /// registered.
    pub async fn test_agent_endpoint(&self, request: &AgentProbeRequest) -> AgentProbeReport {
        self.prober.test_endpoint(request).await
    }

    fn require_server(&self, server_id: &str) -> Result<ToolServerRecord, RegistryError> {
        self.store
            .find_server_by_id(server_id)?
            .ok_or_else(|| {
                CatalogError::ServerNotFound {
                    server_id: server_id.to_string(),
                }
                .into()
            })
    }
}

/// Canonical stored name for `requested`: exact match first, then
/// case-insensitive.
fn resolve_tool_name(tools: &[ToolDefinition], requested: &str) -> Option<String> {
    let requested = requested.trim();
    if requested.is_empty() {
        return None;
    }
    tools
        .iter()
        .find(|t| t.name == requested)
        .or_else(|| tools.iter().find(|t| t.name.eq_ignore_ascii_case(requested)))
        .map(|t| t.name.clone())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
