//! MCP client: JSON-RPC over HTTP for remote tool servers.
//!
//! This module handles:
//! - POSTing JSON-RPC envelopes and decoding JSON or event-stream bodies
//! - The `initialize` handshake with https/http scheme fallback
//! - Session-scoped and sessionless calls (`tools/list`, `tools/call`)
//! - Normalizing tool definitions across upstream naming differences
//!
//! The health reconciler and the registry operations are its callers.

pub mod client;
pub mod document;
pub mod envelope;
pub mod errors;
pub mod normalizer;
pub mod sse;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::McpClient;
pub use errors::{safe_message, McpError, TransportFailure};
pub use normalizer::{normalize, normalize_with_version};
pub use types::{McpSession, ToolDefinition};
