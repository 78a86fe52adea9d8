//! SQLite catalog of tool servers and agents.
//!
//! Uses `rusqlite` in synchronous mode. Every write touches a single row,
//! so each save is atomic on its own and no cross-record transactions are
//! needed. JSON documents are stored as TEXT.

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::errors::CatalogError;
use super::types::{
    now_timestamp, AgentMetadata, AgentRecord, AgentStatus, NewAgent, NewToolServer, ServerStatus,
    ToolServerRecord,
};

const SERVER_COLUMNS: &str = "id, name, version, description, discovery_url, repository_url,
     status, server_doc, created_at, updated_at";

const AGENT_COLUMNS: &str = "id, name, version, description, status, metadata, created_at, updated_at";

// ─── Database ───────────────────────────────────────────────────────────────

/// SQLite database handle for the registry catalog.
pub struct CatalogDatabase {
    conn: Connection,
}

impl CatalogDatabase {
    /// Open (or create) the catalog at the given path.
    ///
    /// Pass `":memory:"` for an in-memory database (tests).
    pub fn open(path: &str) -> Result<Self, CatalogError> {
        let conn = Connection::open(path)?;

        // WAL lets readers proceed while a loop is writing.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let db = Self { conn };
        db.create_tables()?;
        Ok(db)
    }

    /// Create all required tables if they don't exist.
    fn create_tables(&self) -> Result<(), CatalogError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS tool_servers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                description TEXT,
                discovery_url TEXT NOT NULL,
                repository_url TEXT,
                status TEXT NOT NULL DEFAULT 'ACTIVE',
                server_doc TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (name, version)
            );

            CREATE INDEX IF NOT EXISTS idx_tool_servers_status
                ON tool_servers(status);

            CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'ACTIVE',
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (name, version)
            );
            ",
        )?;
        Ok(())
    }

    // ─── Tool servers ───────────────────────────────────────────────────

    /// Register a tool server. New servers start ACTIVE.
    pub fn insert_server(&self, new: &NewToolServer) -> Result<ToolServerRecord, CatalogError> {
        let name = required("name", &new.name)?;
        let version = required("version", &new.version)?;
        let discovery_url = required("discovery_url", &new.discovery_url)?;
        let now = now_timestamp();

        let record = ToolServerRecord {
            id: Uuid::new_v4().to_string(),
            name,
            version,
            description: new.description.clone(),
            discovery_url,
            repository_url: new.repository_url.clone(),
            status: ServerStatus::Active,
            doc: new
                .doc
                .clone()
                .filter(|d| d.is_object())
                .unwrap_or_else(|| serde_json::json!({})),
            created_at: now.clone(),
            updated_at: now,
        };
        self.save_server(&record)?;
        Ok(record)
    }

    /// Insert or replace a tool server row.
    pub fn save_server(&self, server: &ToolServerRecord) -> Result<(), CatalogError> {
        let doc_json = serde_json::to_string(&server.doc)?;
        self.conn.execute(
            "INSERT INTO tool_servers
             (id, name, version, description, discovery_url, repository_url,
              status, server_doc, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                version = excluded.version,
                description = excluded.description,
                discovery_url = excluded.discovery_url,
                repository_url = excluded.repository_url,
                status = excluded.status,
                server_doc = excluded.server_doc,
                updated_at = excluded.updated_at",
            params![
                server.id,
                server.name,
                server.version,
                server.description,
                server.discovery_url,
                server.repository_url,
                server.status.as_str(),
                doc_json,
                server.created_at,
                server.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Write the outcome of a health check: status, document and
    /// `updated_at` only.
    ///
    /// A row that became DISABLED since it was read keeps that status, and a
    /// deleted row stays deleted. Returns whether the row still exists.
    pub fn record_server_health(&self, server: &ToolServerRecord) -> Result<bool, CatalogError> {
        let doc_json = serde_json::to_string(&server.doc)?;
        let changed = self.conn.execute(
            "UPDATE tool_servers SET
                status = CASE WHEN status = 'DISABLED' THEN status ELSE ?2 END,
                server_doc = ?3,
                updated_at = ?4
             WHERE id = ?1",
            params![server.id, server.status.as_str(), doc_json, server.updated_at],
        )?;
        Ok(changed > 0)
    }

    /// Get a tool server by ID.
    pub fn get_server(&self, server_id: &str) -> Result<Option<ToolServerRecord>, CatalogError> {
        let sql = format!("SELECT {SERVER_COLUMNS} FROM tool_servers WHERE id = ?1");
        let result = self
            .conn
            .query_row(&sql, params![server_id], row_to_server)
            .optional()?;
        Ok(result)
    }

    /// List every tool server, oldest first.
    pub fn list_servers(&self) -> Result<Vec<ToolServerRecord>, CatalogError> {
        let sql = format!("SELECT {SERVER_COLUMNS} FROM tool_servers ORDER BY created_at ASC, id ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_server)?;

        let mut servers = Vec::new();
        for row in rows {
            servers.push(row?);
        }
        Ok(servers)
    }

    /// List tool servers whose status differs from `excluded`.
    pub fn list_servers_excluding(
        &self,
        excluded: ServerStatus,
    ) -> Result<Vec<ToolServerRecord>, CatalogError> {
        let sql = format!(
            "SELECT {SERVER_COLUMNS} FROM tool_servers
             WHERE status != ?1
             ORDER BY created_at ASC, id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![excluded.as_str()], row_to_server)?;

        let mut servers = Vec::new();
        for row in rows {
            servers.push(row?);
        }
        Ok(servers)
    }

    /// Set a server's status directly. This is the only way in or out of
    /// DISABLED.
    pub fn set_server_status(&self, server_id: &str, status: ServerStatus) -> Result<(), CatalogError> {
        let changed = self.conn.execute(
            "UPDATE tool_servers SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![server_id, status.as_str(), now_timestamp()],
        )?;
        if changed == 0 {
            return Err(CatalogError::ServerNotFound {
                server_id: server_id.to_string(),
            });
        }
        Ok(())
    }

    /// Delete a tool server. Returns whether a row was removed.
    pub fn delete_server(&self, server_id: &str) -> Result<bool, CatalogError> {
        let changed = self
            .conn
            .execute("DELETE FROM tool_servers WHERE id = ?1", params![server_id])?;
        Ok(changed > 0)
    }

    // ─── Agents ─────────────────────────────────────────────────────────

    /// Register an agent. The discovery descriptor is normalized on the way
    /// in; new agents start ACTIVE until the first reconciler run.
    pub fn insert_agent(&self, new: &NewAgent) -> Result<AgentRecord, CatalogError> {
        let name = required("name", &new.name)?;
        let version = required("version", &new.version)?;
        let metadata = new.metadata.clone().normalized();
        if let Some(discovery) = &metadata.discovery {
            required("discovery.endpoint", &discovery.endpoint)?;
            required("discovery.queryParam", &discovery.query_param)?;
        }
        let now = now_timestamp();

        let record = AgentRecord {
            id: Uuid::new_v4().to_string(),
            name,
            version,
            description: new.description.clone(),
            status: AgentStatus::Active,
            metadata,
            created_at: now.clone(),
            updated_at: now,
        };
        self.save_agent(&record)?;
        Ok(record)
    }

    /// Insert or replace an agent row.
    pub fn save_agent(&self, agent: &AgentRecord) -> Result<(), CatalogError> {
        let metadata_json = serde_json::to_string(&agent.metadata)?;
        self.conn.execute(
            "INSERT INTO agents
             (id, name, version, description, status, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                version = excluded.version,
                description = excluded.description,
                status = excluded.status,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at",
            params![
                agent.id,
                agent.name,
                agent.version,
                agent.description,
                agent.status.as_str(),
                metadata_json,
                agent.created_at,
                agent.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Write the outcome of a health check: status, `metadata.health` and
    /// `updated_at`. Every other metadata key is left as stored.
    ///
    /// Stored metadata that is not a JSON object is not touched. Returns
    /// whether the row still exists.
    pub fn record_agent_health(&self, agent: &AgentRecord) -> Result<bool, CatalogError> {
        let health_json = agent
            .metadata
            .health
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let changed = self.conn.execute(
            "UPDATE agents SET
                status = ?2,
                metadata = CASE
                    WHEN json_valid(metadata) = 0 THEN metadata
                    WHEN json_type(metadata) != 'object' THEN metadata
                    WHEN ?3 IS NULL THEN json_remove(metadata, '$.health')
                    ELSE json_set(metadata, '$.health', json(?3))
                END,
                updated_at = ?4
             WHERE id = ?1",
            params![agent.id, agent.status.as_str(), health_json, agent.updated_at],
        )?;
        Ok(changed > 0)
    }

    /// Get an agent by ID.
    pub fn get_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>, CatalogError> {
        let sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1");
        let result = self
            .conn
            .query_row(&sql, params![agent_id], row_to_agent)
            .optional()?;
        Ok(result)
    }

    /// List every agent, oldest first.
    pub fn list_agents(&self) -> Result<Vec<AgentRecord>, CatalogError> {
        let sql = format!("SELECT {AGENT_COLUMNS} FROM agents ORDER BY created_at ASC, id ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_agent)?;

        let mut agents = Vec::new();
        for row in rows {
            agents.push(row?);
        }
        Ok(agents)
    }

    /// Delete an agent. Returns whether a row was removed.
    pub fn delete_agent(&self, agent_id: &str) -> Result<bool, CatalogError> {
        let changed = self
            .conn
            .execute("DELETE FROM agents WHERE id = ?1", params![agent_id])?;
        Ok(changed > 0)
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn required(field: &str, value: &str) -> Result<String, CatalogError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CatalogError::Validation {
            reason: format!("{field} is required"),
        });
    }
    Ok(trimmed.to_string())
}

fn row_to_server(row: &Row<'_>) -> rusqlite::Result<ToolServerRecord> {
    let status: String = row.get(6)?;
    Ok(ToolServerRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        version: row.get(2)?,
        description: row.get(3)?,
        discovery_url: row.get(4)?,
        repository_url: row.get(5)?,
        // Unknown values fall back to ACTIVE, the registration default.
        status: ServerStatus::parse(&status).unwrap_or(ServerStatus::Active),
        doc: parse_json_value(row.get::<_, String>(7)?),
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn row_to_agent(row: &Row<'_>) -> rusqlite::Result<AgentRecord> {
    let status: String = row.get(4)?;
    Ok(AgentRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        version: row.get(2)?,
        description: row.get(3)?,
        status: AgentStatus::parse(&status).unwrap_or(AgentStatus::Inactive),
        metadata: parse_metadata(row.get::<_, String>(5)?),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Parse a JSON string into a serde_json::Value, defaulting to `{}`.
fn parse_json_value(json: String) -> serde_json::Value {
    serde_json::from_str(&json).unwrap_or_else(|_| serde_json::json!({}))
}

/// Parse agent metadata field by field; rows written before normalization
/// are normalized on read.
fn parse_metadata(json: String) -> AgentMetadata {
    AgentMetadata::from_value(parse_json_value(json)).normalized()
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::{AgentDiscovery, AgentHealth, ProbeMethod, Protocol, ToolRef};
    use serde_json::json;

    fn test_db() -> CatalogDatabase {
        CatalogDatabase::open(":memory:").unwrap()
    }

    fn new_server(name: &str) -> NewToolServer {
        NewToolServer {
            name: name.into(),
            version: "1.0.0".into(),
            description: Some("demo".into()),
            discovery_url: format!("http://localhost:9000/{name}"),
            repository_url: None,
            doc: Some(json!({"tools": [{"name": "echo"}]})),
        }
    }

    #[test]
    fn test_insert_and_get_server() {
        let db = test_db();
        let created = db.insert_server(&new_server("files")).unwrap();
        assert_eq!(created.status, ServerStatus::Active);

        let loaded = db.get_server(&created.id).unwrap().unwrap();
        assert_eq!(loaded, created);
        assert_eq!(loaded.stored_tools()[0].name, "echo");
        assert!(db.get_server("missing").unwrap().is_none());
    }

    #[test]
    fn test_insert_server_requires_fields() {
        let db = test_db();
        let mut bad = new_server("x");
        bad.discovery_url = "  ".into();
        assert!(matches!(
            db.insert_server(&bad),
            Err(CatalogError::Validation { .. })
        ));
    }

    #[test]
    fn test_duplicate_name_version_rejected() {
        let db = test_db();
        db.insert_server(&new_server("files")).unwrap();
        assert!(matches!(
            db.insert_server(&new_server("files")),
            Err(CatalogError::Database { .. })
        ));
    }

    #[test]
    fn test_list_servers_excluding_disabled() {
        let db = test_db();
        let a = db.insert_server(&new_server("a")).unwrap();
        let b = db.insert_server(&new_server("b")).unwrap();
        db.set_server_status(&b.id, ServerStatus::Disabled).unwrap();

        let all = db.list_servers().unwrap();
        assert_eq!(all.len(), 2);

        let active = db.list_servers_excluding(ServerStatus::Disabled).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, a.id);
    }

    #[test]
    fn test_save_server_updates_in_place() {
        let db = test_db();
        let mut s = db.insert_server(&new_server("files")).unwrap();
        s.record_failure("HTTP 500", "2026-01-01T00:00:00Z");
        db.save_server(&s).unwrap();

        let loaded = db.get_server(&s.id).unwrap().unwrap();
        assert_eq!(loaded.status, ServerStatus::Failed);
        assert_eq!(loaded.last_healthcheck_error().as_deref(), Some("HTTP 500"));
        assert_eq!(db.list_servers().unwrap().len(), 1);
    }

    #[test]
    fn test_set_status_unknown_server() {
        let db = test_db();
        assert!(matches!(
            db.set_server_status("nope", ServerStatus::Disabled),
            Err(CatalogError::ServerNotFound { .. })
        ));
    }

    #[test]
    fn test_agent_round_trip_normalizes_discovery() {
        let db = test_db();
        let new = NewAgent {
            name: "helper".into(),
            version: "0.1".into(),
            description: None,
            metadata: AgentMetadata {
                tools: vec![ToolRef {
                    mcp_server_id: "s1".into(),
                    tool_name: "search".into(),
                    mcp_server_name: None,
                    mcp_server_version: None,
                }],
                discovery: Some(AgentDiscovery {
                    protocol: Protocol::Http,
                    endpoint: "https://agent.local/ask/".into(),
                    method: ProbeMethod::Post,
                    query_param: "q".into(),
                }),
                ..Default::default()
            },
        };
        let created = db.insert_agent(&new).unwrap();
        let loaded = db.get_agent(&created.id).unwrap().unwrap();
        assert_eq!(loaded, created);

        let discovery = loaded.metadata.discovery.unwrap();
        assert_eq!(discovery.protocol, Protocol::Https);
        assert_eq!(discovery.endpoint, "agent.local/ask");
        assert_eq!(loaded.metadata.tools.len(), 1);
    }

    #[test]
    fn test_agent_requires_query_param() {
        let db = test_db();
        let new = NewAgent {
            name: "helper".into(),
            version: "0.1".into(),
            description: None,
            metadata: AgentMetadata {
                discovery: Some(AgentDiscovery {
                    protocol: Protocol::Http,
                    endpoint: "agent.local".into(),
                    method: ProbeMethod::Get,
                    query_param: " ".into(),
                }),
                ..Default::default()
            },
        };
        assert!(matches!(
            db.insert_agent(&new),
            Err(CatalogError::Validation { .. })
        ));
    }

    #[test]
    fn test_save_and_delete_agent() {
        let db = test_db();
        let mut agent = db
            .insert_agent(&NewAgent {
                name: "a".into(),
                version: "1".into(),
                ..Default::default()
            })
            .unwrap();
        agent.status = AgentStatus::Inactive;
        db.save_agent(&agent).unwrap();
        assert_eq!(db.list_agents().unwrap()[0].status, AgentStatus::Inactive);

        assert!(db.delete_agent(&agent.id).unwrap());
        assert!(!db.delete_agent(&agent.id).unwrap());
        assert!(db.list_agents().unwrap().is_empty());
    }

    #[test]
    fn test_legacy_metadata_with_scheme_is_normalized_on_read() {
        let db = test_db();
        db.conn
            .execute(
                "INSERT INTO agents (id, name, version, status, metadata, created_at, updated_at)
                 VALUES ('a1', 'legacy', '1', 'ACTIVE', ?1, 't', 't')",
                params![json!({
                    "discovery": {"protocol": "HTTP", "endpoint": "https://old.example/ping", "method": "GET", "queryParam": "q"}
                })
                .to_string()],
            )
            .unwrap();
        let agent = db.get_agent("a1").unwrap().unwrap();
        let discovery = agent.metadata.discovery.unwrap();
        assert_eq!(discovery.protocol, Protocol::Https);
        assert_eq!(discovery.endpoint, "old.example/ping");
    }

    #[test]
    fn test_record_server_health_keeps_disabled_and_other_columns() {
        let db = test_db();
        let mut snapshot = db.insert_server(&new_server("files")).unwrap();
        db.set_server_status(&snapshot.id, ServerStatus::Disabled).unwrap();

        snapshot.name = "renamed-in-memory".into();
        snapshot.record_failure("HTTP 500", "2026-01-01T00:00:00Z");
        assert_eq!(snapshot.status, ServerStatus::Failed);
        assert!(db.record_server_health(&snapshot).unwrap());

        let loaded = db.get_server(&snapshot.id).unwrap().unwrap();
        assert_eq!(loaded.status, ServerStatus::Disabled);
        assert_eq!(loaded.name, "files");
        assert_eq!(loaded.last_healthcheck_error().as_deref(), Some("HTTP 500"));
    }

    #[test]
    fn test_record_server_health_does_not_resurrect() {
        let db = test_db();
        let mut snapshot = db.insert_server(&new_server("files")).unwrap();
        assert!(db.delete_server(&snapshot.id).unwrap());

        snapshot.record_failure("HTTP 500", "2026-01-01T00:00:00Z");
        assert!(!db.record_server_health(&snapshot).unwrap());
        assert!(db.get_server(&snapshot.id).unwrap().is_none());
    }

    #[test]
    fn test_record_agent_health_only_touches_health() {
        let db = test_db();
        db.conn
            .execute(
                "INSERT INTO agents (id, name, version, status, metadata, created_at, updated_at)
                 VALUES ('a1', 'helper', '1', 'ACTIVE', ?1, 't', 't')",
                params![json!({
                    "tools": [{"mcpServerId": 9, "toolName": "search"}],
                    "discovery": {"protocol": "gopher", "endpoint": "agent.local"},
                    "owner": "team-a"
                })
                .to_string()],
            )
            .unwrap();

        let mut agent = db.get_agent("a1").unwrap().unwrap();
        agent.metadata.tools.clear();
        agent.status = AgentStatus::Inactive;
        agent.metadata.health = Some(AgentHealth {
            checked_at: "t1".into(),
            error: Some("down".into()),
        });
        agent.updated_at = "t1".into();
        assert!(db.record_agent_health(&agent).unwrap());

        let raw: String = db
            .conn
            .query_row("SELECT metadata FROM agents WHERE id = 'a1'", [], |row| row.get(0))
            .unwrap();
        let stored: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored["tools"], json!([{"mcpServerId": 9, "toolName": "search"}]));
        assert_eq!(stored["discovery"]["protocol"], "gopher");
        assert_eq!(stored["owner"], "team-a");
        assert_eq!(stored["health"], json!({"checkedAt": "t1", "error": "down"}));

        let loaded = db.get_agent("a1").unwrap().unwrap();
        assert_eq!(loaded.status, AgentStatus::Inactive);
        assert_eq!(loaded.updated_at, "t1");
    }

    #[test]
    fn test_record_agent_health_for_deleted_agent() {
        let db = test_db();
        let agent = db
            .insert_agent(&NewAgent {
                name: "a".into(),
                version: "1".into(),
                ..Default::default()
            })
            .unwrap();
        db.delete_agent(&agent.id).unwrap();
        assert!(!db.record_agent_health(&agent).unwrap());
        assert!(db.get_agent(&agent.id).unwrap().is_none());
    }

    #[test]
    fn test_lenient_metadata_read_keeps_keys() {
        let db = test_db();
        db.conn
            .execute(
                "INSERT INTO agents (id, name, version, status, metadata, created_at, updated_at)
                 VALUES ('a1', 'helper', '1', 'ACTIVE', ?1, 't', 't')",
                params![json!({
                    "tools": [{"mcpServerId": "s1", "toolName": "search"}],
                    "discovery": {"protocol": "Http", "endpoint": "agent.local/ask", "method": "get", "queryParam": "q"},
                    "owner": "team-a"
                })
                .to_string()],
            )
            .unwrap();

        let agent = db.get_agent("a1").unwrap().unwrap();
        assert_eq!(agent.metadata.tools[0].mcp_server_id, "s1");
        let discovery = agent.metadata.discovery.as_ref().unwrap();
        assert_eq!(discovery.protocol, Protocol::Http);
        assert_eq!(discovery.method, ProbeMethod::Get);
        assert_eq!(agent.metadata.extra["owner"], "team-a");
    }
}
