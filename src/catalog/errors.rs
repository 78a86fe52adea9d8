//! Catalog error types.

use thiserror::Error;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Database operation failed.
    #[error("database error: {reason}")]
    Database { reason: String },

    /// A JSON column could not be encoded.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    #[error("tool server not found: '{server_id}'")]
    ServerNotFound { server_id: String },

    /// A record failed validation before it was written.
    #[error("invalid record: {reason}")]
    Validation { reason: String },
}

impl From<rusqlite::Error> for CatalogError {
    fn from(e: rusqlite::Error) -> Self {
        CatalogError::Database {
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(e: serde_json::Error) -> Self {
        CatalogError::Serialization {
            reason: e.to_string(),
        }
    }
}
