//! Health reconciler: two fixed-delay loops over the catalog.
//!
//! The tool-server loop and the agent loop run independently; each waits
//! for its own run to finish before the next delay starts.

pub mod agent_health;
pub mod agent_probe;
pub mod scheduler;
pub mod server_health;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::catalog::CatalogStore;
use crate::config::RegistryConfig;
use crate::mcp_client::McpClient;

pub use agent_health::{AgentHealthJob, AgentVerdict};
pub use agent_probe::{AgentProbeReport, AgentProbeRequest, AgentProber};
pub use scheduler::{run_fixed_delay, Schedule};
pub use server_health::{RunSummary, ServerHealthJob};

/// Both health jobs with their schedules.
pub struct HealthReconciler<S> {
    servers: Arc<ServerHealthJob<S>>,
    agents: Arc<AgentHealthJob<S>>,
    server_schedule: Option<Schedule>,
    agent_schedule: Option<Schedule>,
}

impl<S: CatalogStore + Clone + 'static> HealthReconciler<S> {
    pub fn new(store: S, client: McpClient, prober: AgentProber, config: &RegistryConfig) -> Self {
        let server_cfg = &config.server_health;
        let agent_cfg = &config.agent_health;
        Self {
            servers: Arc::new(ServerHealthJob::new(store.clone(), client, server_cfg)),
            agents: Arc::new(AgentHealthJob::new(store, prober, agent_cfg)),
            server_schedule: server_cfg
                .enabled
                .then(|| Schedule::from_millis(server_cfg.initial_delay_ms, server_cfg.fixed_delay_ms)),
            agent_schedule: agent_cfg
                .enabled
                .then(|| Schedule::from_millis(agent_cfg.initial_delay_ms, agent_cfg.fixed_delay_ms)),
        }
    }

    /// Start the enabled loops. They stop when `shutdown` turns `true`.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        match self.server_schedule {
            Some(schedule) => {
                let job = self.servers;
                handles.push(tokio::spawn(run_fixed_delay(
                    "server-health",
                    schedule,
                    shutdown.clone(),
                    move || {
                        let job = job.clone();
                        async move {
                            job.run_once().await;
                        }
                    },
                )));
            }
            None => tracing::info!("tool server health loop disabled"),
        }

        match self.agent_schedule {
            Some(schedule) => {
                let job = self.agents;
                handles.push(tokio::spawn(run_fixed_delay(
                    "agent-health",
                    schedule,
                    shutdown,
                    move || {
                        let job = job.clone();
                        async move {
                            job.run_once().await;
                        }
                    },
                )));
            }
            None => tracing::info!("agent health loop disabled"),
        }

        handles
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
