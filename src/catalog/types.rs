//! Catalog record types: tool servers, agents, and the agent metadata
//! document.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::mcp_client::document::{scalar_text, Document};
use crate::mcp_client::{normalize_with_version, ToolDefinition};

// ─── Server document keys ────────────────────────────────────────────────────

pub const DOC_TOOLS: &str = "tools";
pub const DOC_VERSION: &str = "version";
pub const DOC_LAST_HEALTHCHECK_TS: &str = "last_healthcheck_ts";
pub const DOC_LAST_TOOLS_REFRESH_TS: &str = "last_tools_refresh_ts";
pub const DOC_LAST_HEALTHCHECK_ERROR: &str = "last_healthcheck_error";

/// Current time as an RFC 3339 UTC timestamp.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

// ─── Status enums ────────────────────────────────────────────────────────────

/// Health status of a tool server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    /// Last probe succeeded.
    Active,
    /// Last probe failed.
    Failed,
    /// Excluded from reconciliation until re-enabled by an operator.
    Disabled,
}

impl ServerStatus {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Active => "ACTIVE",
            ServerStatus::Failed => "FAILED",
            ServerStatus::Disabled => "DISABLED",
        }
    }

    /// Parse from database string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Some(ServerStatus::Active),
            "FAILED" => Some(ServerStatus::Failed),
            "DISABLED" => Some(ServerStatus::Disabled),
            _ => None,
        }
    }
}

/// Health status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Active,
    Inactive,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "ACTIVE",
            AgentStatus::Inactive => "INACTIVE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Some(AgentStatus::Active),
            "INACTIVE" => Some(AgentStatus::Inactive),
            _ => None,
        }
    }
}

// ─── Tool servers ────────────────────────────────────────────────────────────

/// A registered tool server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolServerRecord {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub discovery_url: String,
    pub repository_url: Option<String>,
    pub status: ServerStatus,
    /// Last-known tool list plus health timestamps and error.
    pub doc: Value,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields needed to register a tool server.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewToolServer {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    pub discovery_url: String,
    #[serde(default)]
    pub repository_url: Option<String>,
    /// Initial document; `tools` may be pre-populated.
    #[serde(default)]
    pub doc: Option<Value>,
}

impl ToolServerRecord {
    /// Stored tools; a tool without its own version inherits the document's
    /// `version`, then the record's.
    pub fn stored_tools(&self) -> Vec<ToolDefinition> {
        let doc_version = Document::new(&self.doc).text(DOC_VERSION);
        let fallback = doc_version.as_deref().unwrap_or(&self.version);
        normalize_with_version(&self.doc, Some(fallback))
    }

    pub fn last_healthcheck_ts(&self) -> Option<String> {
        Document::new(&self.doc).text(DOC_LAST_HEALTHCHECK_TS)
    }

    pub fn last_tools_refresh_ts(&self) -> Option<String> {
        Document::new(&self.doc).text(DOC_LAST_TOOLS_REFRESH_TS)
    }

    pub fn last_healthcheck_error(&self) -> Option<String> {
        Document::new(&self.doc).text(DOC_LAST_HEALTHCHECK_ERROR)
    }

    /// Apply a successful probe: replace the tool list, stamp both
    /// timestamps, clear the error, and mark ACTIVE.
    ///
    /// A DISABLED server keeps its status.
    pub fn record_healthy(&mut self, tools: &[ToolDefinition], now: &str) {
        let tools_value = Value::Array(
            tools
                .iter()
                .map(|t| serde_json::to_value(t).unwrap_or(Value::Null))
                .filter(|v| !v.is_null())
                .collect(),
        );
        self.update_doc(|doc| {
            doc.insert(DOC_TOOLS.to_string(), tools_value);
            doc.insert(DOC_LAST_TOOLS_REFRESH_TS.to_string(), json!(now));
            doc.insert(DOC_LAST_HEALTHCHECK_TS.to_string(), json!(now));
            doc.remove(DOC_LAST_HEALTHCHECK_ERROR);
        });

        if self.status != ServerStatus::Disabled {
            self.status = ServerStatus::Active;
        }
        self.updated_at = now.to_string();
    }

    /// Apply a failed probe: stamp the check time and error, mark FAILED.
    /// The stored tool list is left untouched.
    pub fn record_failure(&mut self, message: &str, now: &str) {
        self.update_doc(|doc| {
            doc.insert(DOC_LAST_HEALTHCHECK_TS.to_string(), json!(now));
            doc.insert(DOC_LAST_HEALTHCHECK_ERROR.to_string(), json!(message));
        });

        if self.status != ServerStatus::Disabled {
            self.status = ServerStatus::Failed;
        }
        self.updated_at = now.to_string();
    }

    /// Edit the document as an object. A non-object document is replaced.
    fn update_doc(&mut self, edit: impl FnOnce(&mut Map<String, Value>)) {
        let mut map = match std::mem::take(&mut self.doc) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        edit(&mut map);
        self.doc = Value::Object(map);
    }
}

// ─── Agents ──────────────────────────────────────────────────────────────────

/// Scheme used to reach an agent's discovery endpoint.
///
/// Serialized upper-case; read in any case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Protocol {
    #[serde(rename = "HTTP")]
    Http,
    #[serde(rename = "HTTPS")]
    Https,
}

impl<'de> Deserialize<'de> for Protocol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Protocol::parse(&raw).ok_or_else(|| de::Error::custom(format!("unknown protocol '{raw}'")))
    }
}

impl Protocol {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Some(Protocol::Http),
            "https" => Some(Protocol::Https),
            _ => None,
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

/// HTTP method used for the discovery probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProbeMethod {
    #[serde(rename = "GET")]
    Get,
    #[serde(rename = "POST")]
    Post,
    #[serde(rename = "PUT")]
    Put,
}

impl<'de> Deserialize<'de> for ProbeMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ProbeMethod::parse(&raw).ok_or_else(|| de::Error::custom(format!("unknown method '{raw}'")))
    }
}

impl ProbeMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(ProbeMethod::Get),
            "POST" => Some(ProbeMethod::Post),
            "PUT" => Some(ProbeMethod::Put),
            _ => None,
        }
    }

    /// Whether the probe carries a JSON body.
    pub fn has_body(&self) -> bool {
        matches!(self, ProbeMethod::Post | ProbeMethod::Put)
    }
}

/// Where and how to probe an agent.
///
/// `endpoint` is `host[:port][/path]` and never carries a scheme; the
/// scheme lives in `protocol`. Use [`AgentDiscovery::normalized`] on
/// anything coming from outside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDiscovery {
    pub protocol: Protocol,
    pub endpoint: String,
    pub method: ProbeMethod,
    pub query_param: String,
}

impl AgentDiscovery {
    /// Canonical form: a scheme embedded in `endpoint` overrides `protocol`
    /// and is stripped; whitespace and trailing slashes are trimmed.
    pub fn normalized(mut self) -> Self {
        let mut endpoint = self.endpoint.trim().to_string();
        if let Some((scheme, rest)) = endpoint.split_once("://") {
            if let Some(protocol) = Protocol::parse(scheme) {
                self.protocol = protocol;
            }
            endpoint = rest.to_string();
        }
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self.query_param = self.query_param.trim().to_string();
        self
    }
}

/// A dependency of an agent on one tool of one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRef {
    #[serde(deserialize_with = "scalar_string")]
    pub mcp_server_id: String,
    #[serde(deserialize_with = "scalar_string")]
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_server_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_server_version: Option<String>,
}

/// Outcome of the most recent agent health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentHealth {
    pub checked_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Ids written as numbers or booleans are read as their text.
fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    scalar_text(&raw).ok_or_else(|| de::Error::custom(format!("expected a non-empty string, got {raw}")))
}

/// Agent metadata document. Unknown keys are preserved.
///
/// Reading never fails: see [`AgentMetadata::from_value`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgentMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub llms: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery: Option<AgentDiscovery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<AgentHealth>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentMetadata {
    /// Read a metadata document field by field.
    ///
    /// A known key whose value does not fit its type stays in `extra`
    /// unchanged, so writing the record back loses nothing. Unreadable
    /// `tools` entries are left out of the typed list. A non-object
    /// document reads as empty.
    pub fn from_value(value: Value) -> Self {
        let mut map = match value {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                tracing::warn!(kind = json_kind(&other), "agent metadata is not an object, ignoring it");
                Map::new()
            }
        };

        let llms = take_typed(&mut map, "llms").unwrap_or_default();
        let tools = match map.remove("tools") {
            Some(Value::Array(entries)) => read_tool_refs(entries),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                tracing::warn!(kind = json_kind(&other), "agent metadata tools is not a list, kept as-is");
                map.insert("tools".to_string(), other);
                Vec::new()
            }
        };
        let discovery = take_typed(&mut map, "discovery");
        let health = take_typed(&mut map, "health");

        Self {
            llms,
            tools,
            discovery,
            health,
            extra: map,
        }
    }

    pub fn normalized(mut self) -> Self {
        self.discovery = self.discovery.map(AgentDiscovery::normalized);
        self
    }
}

impl<'de> Deserialize<'de> for AgentMetadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(AgentMetadata::from_value)
    }
}

/// Remove `key` and parse it. On a parse failure the raw value goes back
/// into the map.
fn take_typed<T: DeserializeOwned>(map: &mut Map<String, Value>, key: &str) -> Option<T> {
    let raw = map.remove(key)?;
    if raw.is_null() {
        return None;
    }
    match serde_json::from_value::<T>(raw.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!(key, error = %e, "unreadable agent metadata field, kept as-is");
            map.insert(key.to_string(), raw);
            None
        }
    }
}

fn read_tool_refs(entries: Vec<Value>) -> Vec<ToolRef> {
    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<ToolRef>(entry) {
            Ok(tool) => Some(tool),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable agent tool reference");
                None
            }
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A registered agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub status: AgentStatus,
    pub metadata: AgentMetadata,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields needed to register an agent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAgent {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: AgentMetadata,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn server(doc: Value) -> ToolServerRecord {
        ToolServerRecord {
            id: "s1".into(),
            name: "files".into(),
            version: "1.0.0".into(),
            description: None,
            discovery_url: "http://localhost:9000/mcp".into(),
            repository_url: None,
            status: ServerStatus::Active,
            doc,
            created_at: "t0".into(),
            updated_at: "t0".into(),
        }
    }

    fn tool(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: None,
            version: None,
            arguments: Some(json!({"type": "object"})),
        }
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [ServerStatus::Active, ServerStatus::Failed, ServerStatus::Disabled] {
            assert_eq!(ServerStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ServerStatus::parse("disabled"), Some(ServerStatus::Disabled));
        assert_eq!(ServerStatus::parse("gone"), None);
        assert_eq!(AgentStatus::parse("inactive"), Some(AgentStatus::Inactive));
    }

    #[test]
    fn test_record_healthy_replaces_tools_and_clears_error() {
        let mut s = server(json!({"tools": [{"name": "old"}], "last_healthcheck_error": "boom"}));
        s.status = ServerStatus::Failed;
        s.record_healthy(&[tool("new")], "t1");

        assert_eq!(s.status, ServerStatus::Active);
        assert_eq!(s.doc["tools"], json!([{"name": "new", "arguments": {"type": "object"}}]));
        assert_eq!(s.last_healthcheck_ts().as_deref(), Some("t1"));
        assert_eq!(s.last_tools_refresh_ts().as_deref(), Some("t1"));
        assert!(s.last_healthcheck_error().is_none());
        assert_eq!(s.updated_at, "t1");
    }

    #[test]
    fn test_record_failure_keeps_tools() {
        let mut s = server(json!({"tools": [{"name": "keep"}], "last_tools_refresh_ts": "t0"}));
        s.record_failure("HTTP 500", "t2");

        assert_eq!(s.status, ServerStatus::Failed);
        assert_eq!(s.doc["tools"], json!([{"name": "keep"}]));
        assert_eq!(s.last_healthcheck_error().as_deref(), Some("HTTP 500"));
        assert_eq!(s.last_healthcheck_ts().as_deref(), Some("t2"));
        assert_eq!(s.last_tools_refresh_ts().as_deref(), Some("t0"));
    }

    #[test]
    fn test_disabled_status_is_sticky() {
        let mut s = server(json!({}));
        s.status = ServerStatus::Disabled;
        s.record_failure("x", "t1");
        assert_eq!(s.status, ServerStatus::Disabled);
        s.record_healthy(&[], "t2");
        assert_eq!(s.status, ServerStatus::Disabled);
    }

    #[test]
    fn test_non_object_doc_is_replaced() {
        let mut s = server(Value::Null);
        s.record_failure("x", "t1");
        assert!(s.doc.is_object());
    }

    #[test]
    fn test_stored_tools_version_fallback() {
        let s = server(json!({"version": "2.0", "tools": [{"name": "a"}, {"name": "b", "version": "3"}]}));
        let tools = s.stored_tools();
        assert_eq!(tools[0].version.as_deref(), Some("2.0"));
        assert_eq!(tools[1].version.as_deref(), Some("3"));

        let s = server(json!({"tools": [{"name": "a"}]}));
        assert_eq!(s.stored_tools()[0].version.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_discovery_normalization_strips_scheme() {
        let d = AgentDiscovery {
            protocol: Protocol::Http,
            endpoint: " https://agents.example.com/probe/ ".into(),
            method: ProbeMethod::Get,
            query_param: " q ".into(),
        }
        .normalized();
        assert_eq!(d.protocol, Protocol::Https);
        assert_eq!(d.endpoint, "agents.example.com/probe");
        assert_eq!(d.query_param, "q");
    }

    #[test]
    fn test_metadata_wire_shape() {
        let raw = json!({
            "llms": [{"name": "gpt"}],
            "tools": [{"mcpServerId": "s1", "toolName": "search", "mcpServerName": "files"}],
            "discovery": {"protocol": "http", "endpoint": "localhost:8080/ask", "method": "post", "queryParam": "q"},
            "owner": "team-a"
        });
        let meta: AgentMetadata = serde_json::from_value(raw).unwrap();
        assert_eq!(meta.tools[0].mcp_server_id, "s1");
        assert_eq!(meta.tools[0].tool_name, "search");
        let discovery = meta.discovery.as_ref().unwrap();
        assert_eq!(discovery.method, ProbeMethod::Post);
        assert_eq!(discovery.protocol, Protocol::Http);
        assert_eq!(meta.extra["owner"], "team-a");

        let back = serde_json::to_value(&meta).unwrap();
        assert_eq!(back["discovery"]["method"], "POST");
        assert_eq!(back["discovery"]["queryParam"], "q");
        assert_eq!(back["owner"], "team-a");
    }

    #[test]
    fn test_metadata_reads_mixed_case_and_numeric_ids() {
        let raw = json!({
            "tools": [{"mcpServerId": 7, "toolName": "search"}],
            "discovery": {"protocol": "Https", "endpoint": "agent.local", "method": "Get", "queryParam": "q"}
        });
        let meta = AgentMetadata::from_value(raw);
        assert_eq!(meta.tools[0].mcp_server_id, "7");
        let discovery = meta.discovery.unwrap();
        assert_eq!(discovery.protocol, Protocol::Https);
        assert_eq!(discovery.method, ProbeMethod::Get);
    }

    #[test]
    fn test_metadata_keeps_unreadable_fields() {
        let raw = json!({
            "tools": [{"mcpServerId": "s1", "toolName": "search"}, {"toolName": "orphan"}],
            "discovery": {"protocol": "gopher", "endpoint": "agent.local"},
            "health": "stale",
            "owner": "team-a"
        });
        let meta = AgentMetadata::from_value(raw.clone());
        assert_eq!(meta.tools.len(), 1);
        assert_eq!(meta.tools[0].tool_name, "search");
        assert!(meta.discovery.is_none());
        assert!(meta.health.is_none());
        assert_eq!(meta.extra["discovery"], raw["discovery"]);
        assert_eq!(meta.extra["health"], "stale");
        assert_eq!(meta.extra["owner"], "team-a");

        let back = serde_json::to_value(&meta).unwrap();
        assert_eq!(back["discovery"], raw["discovery"]);
        assert_eq!(back["health"], "stale");
        assert_eq!(back["owner"], "team-a");
    }

    #[test]
    fn test_metadata_tools_not_a_list_is_kept() {
        let meta = AgentMetadata::from_value(json!({"tools": "search", "llms": [{"name": "gpt"}]}));
        assert!(meta.tools.is_empty());
        assert_eq!(meta.llms.len(), 1);
        let back = serde_json::to_value(&meta).unwrap();
        assert_eq!(back["tools"], "search");

        assert_eq!(AgentMetadata::from_value(json!([1, 2])), AgentMetadata::default());
    }
}
