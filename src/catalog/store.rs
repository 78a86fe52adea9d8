//! The catalog as seen by the reconciler.
//!
//! Reads happen in bulk at the start of a run; writes are one record at a
//! time and only touch the health columns, so operator edits made while a
//! run is in flight survive it.

use std::sync::{Arc, Mutex};

use super::database::CatalogDatabase;
use super::errors::CatalogError;
use super::types::{AgentRecord, ServerStatus, ToolServerRecord};

/// Catalog operations used by the health reconciler.
pub trait CatalogStore: Send + Sync {
    /// Every server whose status is not `excluded`.
    fn list_servers_excluding(&self, excluded: ServerStatus) -> Result<Vec<ToolServerRecord>, CatalogError>;

    fn find_server_by_id(&self, server_id: &str) -> Result<Option<ToolServerRecord>, CatalogError>;

    /// Persist status, document and `updated_at` of an existing server.
    /// DISABLED is never overwritten. `Ok(false)` when the row is gone.
    fn record_server_health(&self, server: &ToolServerRecord) -> Result<bool, CatalogError>;

    fn list_agents(&self) -> Result<Vec<AgentRecord>, CatalogError>;

    /// Persist status, `metadata.health` and `updated_at` of an existing
    /// agent. `Ok(false)` when the row is gone.
    fn record_agent_health(&self, agent: &AgentRecord) -> Result<bool, CatalogError>;
}

/// A [`CatalogDatabase`] shared between tasks.
///
/// The lock is held only for the duration of one synchronous call, never
/// across an `.await`.
#[derive(Clone)]
pub struct SharedCatalog {
    inner: Arc<Mutex<CatalogDatabase>>,
}

impl SharedCatalog {
    pub fn new(db: CatalogDatabase) -> Self {
        Self {
            inner: Arc::new(Mutex::new(db)),
        }
    }

    /// Run a closure against the locked database.
    pub fn with<R>(
        &self,
        f: impl FnOnce(&CatalogDatabase) -> Result<R, CatalogError>,
    ) -> Result<R, CatalogError> {
        let db = self.inner.lock().map_err(|e| CatalogError::Database {
            reason: format!("lock poisoned: {e}"),
        })?;
        f(&db)
    }
}

impl CatalogStore for SharedCatalog {
    fn list_servers_excluding(&self, excluded: ServerStatus) -> Result<Vec<ToolServerRecord>, CatalogError> {
        self.with(|db| db.list_servers_excluding(excluded))
    }

    fn find_server_by_id(&self, server_id: &str) -> Result<Option<ToolServerRecord>, CatalogError> {
        self.with(|db| db.get_server(server_id))
    }

    fn record_server_health(&self, server: &ToolServerRecord) -> Result<bool, CatalogError> {
        self.with(|db| db.record_server_health(server))
    }

    fn list_agents(&self) -> Result<Vec<AgentRecord>, CatalogError> {
        self.with(|db| db.list_agents())
    }

    fn record_agent_health(&self, agent: &AgentRecord) -> Result<bool, CatalogError> {
        self.with(|db| db.record_agent_health(agent))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::NewToolServer;

    #[test]
    fn test_shared_catalog_clones_see_same_rows() {
        let catalog = SharedCatalog::new(CatalogDatabase::open(":memory:").unwrap());
        let other = catalog.clone();

        let server = catalog
            .with(|db| {
                db.insert_server(&NewToolServer {
                    name: "files".into(),
                    version: "1".into(),
                    discovery_url: "http://localhost/mcp".into(),
                    ..Default::default()
                })
            })
            .unwrap();

        let found = other.find_server_by_id(&server.id).unwrap().unwrap();
        assert_eq!(found.name, "files");
        assert_eq!(other.list_servers_excluding(ServerStatus::Disabled).unwrap().len(), 1);
    }
}
