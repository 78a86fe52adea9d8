//! Agent health loop.
//!
//! An agent is only as healthy as the tool servers it depends on. If any
//! referenced server is FAILED (or gone) the agent goes INACTIVE without a
//! network call. Otherwise its discovery endpoint is probed and a 2xx
//! answer makes it ACTIVE.

use std::collections::HashMap;
use std::time::Instant;

use crate::catalog::types::now_timestamp;
use crate::catalog::{AgentHealth, AgentRecord, AgentStatus, CatalogStore, ServerStatus};
use crate::config::AgentHealthConfig;

use super::agent_probe::{AgentProber, DEFAULT_PROBE_QUERY};
use super::server_health::RunSummary;

/// Why an agent ended up in the state it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentVerdict {
    /// Probe answered 2xx.
    Active { status: u16 },
    /// A referenced server is FAILED.
    DependencyFailed { server_id: String, tool_name: String },
    /// A referenced server no longer exists.
    DependencyMissing { server_id: String, tool_name: String },
    /// No usable discovery descriptor, a non-2xx answer, or no answer.
    Unreachable { reason: String },
    /// The catalog could not be read while checking.
    CheckError { reason: String },
}

impl AgentVerdict {
    pub fn status(&self) -> AgentStatus {
        match self {
            AgentVerdict::Active { .. } => AgentStatus::Active,
            _ => AgentStatus::Inactive,
        }
    }

    /// Message recorded in `metadata.health.error`, if any.
    pub fn error(&self) -> Option<String> {
        match self {
            AgentVerdict::Active { .. } => None,
            AgentVerdict::DependencyFailed { server_id, tool_name } => Some(format!(
                "Tool server {server_id} is FAILED (required for tool '{tool_name}')"
            )),
            AgentVerdict::DependencyMissing { server_id, tool_name } => Some(format!(
                "Tool server {server_id} not found (required for tool '{tool_name}')"
            )),
            AgentVerdict::Unreachable { reason } | AgentVerdict::CheckError { reason } => {
                Some(reason.clone())
            }
        }
    }
}

/// Known server statuses for one run. `None` means the server is missing.
pub type ServerStatusCache = HashMap<String, Option<ServerStatus>>;

/// Probes agents and persists their health.
pub struct AgentHealthJob<S> {
    store: S,
    prober: AgentProber,
    probe_query: String,
}

impl<S: CatalogStore> AgentHealthJob<S> {
    pub fn new(store: S, prober: AgentProber, config: &AgentHealthConfig) -> Self {
        let query = config.probe_query.trim();
        Self {
            store,
            prober,
            probe_query: if query.is_empty() {
                DEFAULT_PROBE_QUERY.to_string()
            } else {
                query.to_string()
            },
        }
    }

    /// One pass over every agent, sequentially.
    pub async fn run_once(&self) -> RunSummary {
        let start = Instant::now();
        let agents = match self.store.list_agents() {
            Ok(agents) => agents,
            Err(e) => {
                tracing::error!(error = %e, "failed to load agents for health check");
                return RunSummary::default();
            }
        };

        if agents.is_empty() {
            tracing::debug!("no agents to check");
            return RunSummary::default();
        }

        let mut cache = ServerStatusCache::new();
        let mut summary = RunSummary::default();
        for agent in agents {
            let checked = self.check_agent(agent, &mut cache).await;
            match checked.status {
                AgentStatus::Active => summary.ok += 1,
                AgentStatus::Inactive => summary.failed += 1,
            }
        }

        tracing::info!(
            active = summary.ok,
            inactive = summary.failed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "agent health run complete"
        );
        summary
    }

    /// Decide, apply and record one agent's health. Only status,
    /// `metadata.health` and `updated_at` are written. Returns the updated
    /// record.
    pub async fn check_agent(&self, mut agent: AgentRecord, cache: &mut ServerStatusCache) -> AgentRecord {
        let start = Instant::now();
        let verdict = self.evaluate(&agent, cache).await;
        let latency_ms = start.elapsed().as_millis() as u64;
        let now = now_timestamp();

        agent.status = verdict.status();
        agent.metadata.health = Some(AgentHealth {
            checked_at: now.clone(),
            error: verdict.error(),
        });
        agent.updated_at = now;

        match &verdict {
            AgentVerdict::Active { status } => tracing::info!(
                agent_id = %agent.id,
                agent = %agent.name,
                status,
                latency_ms,
                "agent healthy"
            ),
            AgentVerdict::DependencyFailed { server_id, .. } | AgentVerdict::DependencyMissing { server_id, .. } => {
                tracing::warn!(
                    agent_id = %agent.id,
                    agent = %agent.name,
                    server_id = %server_id,
                    "agent inactive: dependency unavailable"
                )
            }
            other => tracing::warn!(
                agent_id = %agent.id,
                agent = %agent.name,
                latency_ms,
                error = %other.error().unwrap_or_default(),
                "agent health check failed"
            ),
        }

        match self.store.record_agent_health(&agent) {
            Ok(true) => {}
            Ok(false) => tracing::warn!(agent_id = %agent.id, agent = %agent.name, "agent removed during health check"),
            Err(e) => tracing::error!(agent_id = %agent.id, error = %e, "failed to persist agent health"),
        }
        agent
    }

    async fn evaluate(&self, agent: &AgentRecord, cache: &mut ServerStatusCache) -> AgentVerdict {
        for tool in &agent.metadata.tools {
            let status = match cache.get(&tool.mcp_server_id) {
                Some(status) => *status,
                None => match self.store.find_server_by_id(&tool.mcp_server_id) {
                    Ok(server) => {
                        let status = server.map(|s| s.status);
                        cache.insert(tool.mcp_server_id.clone(), status);
                        status
                    }
                    Err(e) => {
                        return AgentVerdict::CheckError {
                            reason: format!("failed to load tool server {}: {e}", tool.mcp_server_id),
                        }
                    }
                },
            };

            match status {
                Some(ServerStatus::Failed) => {
                    return AgentVerdict::DependencyFailed {
                        server_id: tool.mcp_server_id.clone(),
                        tool_name: tool.tool_name.clone(),
                    }
                }
                None => {
                    return AgentVerdict::DependencyMissing {
                        server_id: tool.mcp_server_id.clone(),
                        tool_name: tool.tool_name.clone(),
                    }
                }
                Some(_) => {}
            }
        }

        let Some(discovery) = agent.metadata.discovery.as_ref() else {
            return AgentVerdict::Unreachable {
                reason: "No discovery endpoint configured".to_string(),
            };
        };

        match self.prober.probe(discovery, &self.probe_query, None).await {
            Ok(response) if response.is_success() => AgentVerdict::Active {
                status: response.status,
            },
            Ok(response) => AgentVerdict::Unreachable {
                reason: format!("Endpoint returned HTTP {}", response.status),
            },
            Err(e) => AgentVerdict::Unreachable {
                reason: e.friendly_message(),
            },
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
