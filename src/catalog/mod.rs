//! Persisted tool servers and agents.
//!
//! The reconciler depends only on the [`CatalogStore`] trait.
//! [`CatalogDatabase`] is the bundled SQLite implementation.

pub mod database;
pub mod errors;
pub mod store;
pub mod types;

pub use database::CatalogDatabase;
pub use errors::CatalogError;
pub use store::{CatalogStore, SharedCatalog};
pub use types::{
    AgentDiscovery, AgentHealth, AgentMetadata, AgentRecord, AgentStatus, NewAgent, NewToolServer, ProbeMethod,
    Protocol, ServerStatus, ToolRef, ToolServerRecord,
};
