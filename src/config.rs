//! Registry configuration loading.
//!
//! Reads `agent-registry.yaml` and resolves environment variables. Every
//! key is optional; a missing file means built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::mcp_client::envelope::DEFAULT_PROTOCOL_VERSION;

// ─── Constants ───────────────────────────────────────────────────────────────

/// File name searched for when no explicit path is configured.
pub const CONFIG_FILE_NAME: &str = "agent-registry.yaml";

/// Env var pointing at an explicit config file.
pub const CONFIG_PATH_ENV: &str = "AGENT_REGISTRY_CONFIG";

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {reason}")]
    Parse { reason: String },
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Protocol client settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default = "default_client_version")]
    pub client_version: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Cap on a single HTTP exchange.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Default timeout for `tools/call` pass-through.
    #[serde(default = "default_invoke_timeout_ms")]
    pub invoke_timeout_ms: u64,
}

/// Tool-server health loop settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerHealthConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_fixed_delay_ms")]
    pub fixed_delay_ms: u64,
    #[serde(default = "default_server_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Run `initialize` before `tools/list` on every probe. Off by default
    /// because some servers refuse repeated handshakes over stateless HTTP.
    #[serde(default)]
    pub handshake_before_probe: bool,
}

/// Agent health loop settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentHealthConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_fixed_delay_ms")]
    pub fixed_delay_ms: u64,
    #[serde(default = "default_agent_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Value sent in the discovery query parameter.
    #[serde(default = "default_probe_query")]
    pub probe_query: String,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

/// Top-level configuration (mirrors `agent-registry.yaml`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryConfig {
    /// SQLite catalog path. Defaults to `registry.db` in the data directory.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub server_health: ServerHealthConfig,
    #[serde(default)]
    pub agent_health: AgentHealthConfig,
}

fn default_protocol_version() -> String {
    DEFAULT_PROTOCOL_VERSION.to_string()
}
fn default_client_name() -> String {
    "agent-registry".to_string()
}
fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
fn default_connect_timeout_ms() -> u64 {
    6_000
}
fn default_request_timeout_ms() -> u64 {
    12_000
}
fn default_invoke_timeout_ms() -> u64 {
    30_000
}
fn default_true() -> bool {
    true
}
fn default_initial_delay_ms() -> u64 {
    2_000
}
fn default_fixed_delay_ms() -> u64 {
    60_000
}
fn default_server_probe_timeout_ms() -> u64 {
    15_000
}
fn default_agent_probe_timeout_ms() -> u64 {
    6_000
}
fn default_probe_query() -> String {
    "test".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            protocol_version: default_protocol_version(),
            client_name: default_client_name(),
            client_version: default_client_version(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            invoke_timeout_ms: default_invoke_timeout_ms(),
        }
    }
}

impl Default for ServerHealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: default_initial_delay_ms(),
            fixed_delay_ms: default_fixed_delay_ms(),
            probe_timeout_ms: default_server_probe_timeout_ms(),
            handshake_before_probe: false,
        }
    }
}

impl Default for AgentHealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: default_initial_delay_ms(),
            fixed_delay_ms: default_fixed_delay_ms(),
            probe_timeout_ms: default_agent_probe_timeout_ms(),
            probe_query: default_probe_query(),
            accept_invalid_certs: false,
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_millis(self.invoke_timeout_ms)
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// `AGENT_REGISTRY_CONFIG` wins when it names an existing file; otherwise
/// searches upward from `start` for `agent-registry.yaml`.
pub fn find_config_path(start: &Path) -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV) {
        let candidate = PathBuf::from(expand_tilde(&explicit));
        if candidate.exists() {
            return Some(candidate);
        }
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Load and parse a configuration file.
///
/// Performs environment-variable interpolation on `${VAR_NAME}` and
/// `${VAR_NAME:-default}` before parsing.
pub fn load_config(path: &Path) -> Result<RegistryConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_config(&raw)
}

/// Parse configuration text. An empty document yields the defaults.
pub fn parse_config(raw: &str) -> Result<RegistryConfig, ConfigError> {
    let interpolated = interpolate_env_vars(raw);
    if interpolated.trim().is_empty() {
        return Ok(RegistryConfig::default());
    }
    serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
        reason: e.to_string(),
    })
}

/// Find and load the config, falling back to defaults when none exists.
pub fn load_or_default(start: &Path) -> Result<(RegistryConfig, Option<PathBuf>), ConfigError> {
    match find_config_path(start) {
        Some(path) => Ok((load_config(&path)?, Some(path))),
        None => Ok((RegistryConfig::default(), None)),
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name).unwrap_or_else(|_| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
pub(crate) fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
