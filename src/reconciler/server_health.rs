//! Tool-server health loop.
//!
//! Every non-DISABLED server is probed in turn with `tools/list`. Success
//! refreshes the stored tools and marks the server ACTIVE; any failure
//! marks it FAILED and records a message, leaving the stored tools alone.
//! Each server is written on its own so one bad server never blocks another,
//! and only its health columns are written.

use std::time::{Duration, Instant};

use crate::catalog::types::now_timestamp;
use crate::catalog::{CatalogStore, ServerStatus, ToolServerRecord};
use crate::config::ServerHealthConfig;
use crate::mcp_client::{safe_message, McpClient, McpError, ToolDefinition};

/// Counts from one reconciler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ok: usize,
    pub failed: usize,
}

/// Probes tool servers and persists their health.
pub struct ServerHealthJob<S> {
    store: S,
    client: McpClient,
    probe_timeout: Duration,
    handshake_before_probe: bool,
}

impl<S: CatalogStore> ServerHealthJob<S> {
    pub fn new(store: S, client: McpClient, config: &ServerHealthConfig) -> Self {
        Self {
            store,
            client,
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
            handshake_before_probe: config.handshake_before_probe,
        }
    }

    /// One pass over every non-DISABLED server, sequentially.
    pub async fn run_once(&self) -> RunSummary {
        let start = Instant::now();
        let servers = match self.store.list_servers_excluding(ServerStatus::Disabled) {
            Ok(servers) => servers,
            Err(e) => {
                tracing::error!(error = %e, "failed to load tool servers for health check");
                return RunSummary::default();
            }
        };

        if servers.is_empty() {
            tracing::debug!("no tool servers to check");
            return RunSummary::default();
        }

        let mut summary = RunSummary::default();
        for server in servers {
            let checked = self.check_server(server).await;
            if checked.status == ServerStatus::Failed {
                summary.failed += 1;
            } else {
                summary.ok += 1;
            }
        }

        tracing::info!(
            ok = summary.ok,
            failed = summary.failed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "tool server health run complete"
        );
        summary
    }

    /// Check one server, apply the outcome, and record it.
    ///
    /// Never fails: check errors land on the record, and a failed write is
    /// logged. Returns the stored row after the write, or the in-memory
    /// record when it cannot be read back.
    pub async fn check_server(&self, mut server: ToolServerRecord) -> ToolServerRecord {
        let start = Instant::now();
        let outcome = self.probe(&server.discovery_url).await;
        let latency_ms = start.elapsed().as_millis() as u64;
        let now = now_timestamp();

        match outcome {
            Ok(tools) => {
                server.record_healthy(&tools, &now);
                tracing::info!(
                    server_id = %server.id,
                    server = %server.name,
                    tools = tools.len(),
                    latency_ms,
                    "tool server healthy"
                );
            }
            Err(e) => {
                let message = failure_message(&e);
                server.record_failure(&message, &now);
                tracing::warn!(
                    server_id = %server.id,
                    server = %server.name,
                    url = %server.discovery_url,
                    latency_ms,
                    connectivity = e.is_connectivity(),
                    error = %message,
                    "tool server health check failed"
                );
            }
        }

        match self.store.record_server_health(&server) {
            Ok(true) => match self.store.find_server_by_id(&server.id) {
                Ok(Some(stored)) => return stored,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(server_id = %server.id, error = %e, "failed to reload tool server after health check")
                }
            },
            Ok(false) => {
                tracing::warn!(server_id = %server.id, server = %server.name, "tool server removed during health check")
            }
            Err(e) => {
                tracing::error!(server_id = %server.id, error = %e, "failed to persist tool server health")
            }
        }
        server
    }

    async fn probe(&self, discovery_url: &str) -> Result<Vec<ToolDefinition>, McpError> {
        let probe = async {
            if self.handshake_before_probe {
                let session = self.client.initialize(discovery_url).await?;
                self.client.list_tools(&session).await
            } else {
                self.client.probe_tools(discovery_url).await
            }
        };

        tokio::time::timeout(self.probe_timeout, probe)
            .await
            .map_err(|_| McpError::Timeout {
                operation: "tools/list probe".into(),
                timeout_ms: self.probe_timeout.as_millis() as u64,
            })?
    }
}

/// Message stored on a failed record: the friendly label for connectivity
/// failures, otherwise the error text.
fn failure_message(err: &McpError) -> String {
    let friendly = err.friendly_message();
    if friendly.trim().is_empty() {
        safe_message(err)
    } else {
        friendly
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
