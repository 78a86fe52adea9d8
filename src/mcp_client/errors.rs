//! MCP client error types.
//!
//! Three families surface from the client:
//! - configuration problems (blank or non-HTTP discovery URL)
//! - transport problems (DNS, refused connection, timeout, non-2xx status)
//! - protocol problems (malformed JSON-RPC, missing `result`, `error` object)
//!
//! `ConnectExhausted` aggregates a failed handshake across every scheme
//! candidate that was tried.

use thiserror::Error;

// ─── Transport classification ────────────────────────────────────────────────

/// Coarse classification of an outbound call that never produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    /// Host name could not be resolved.
    Dns,
    /// TCP connect was refused or the host was unreachable.
    Connect,
    /// Connect or overall request deadline elapsed.
    Timeout,
    /// Anything else (TLS failure, reset mid-body, ...).
    Other,
}

impl TransportFailure {
    /// Operator-facing label, or `None` when the raw reason should be shown.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            TransportFailure::Dns => Some("Unknown host (DNS resolution failed)"),
            TransportFailure::Connect => Some("Connection failed (refused or unreachable)"),
            TransportFailure::Timeout => Some("Connection timed out"),
            TransportFailure::Other => None,
        }
    }
}

// ─── McpError ────────────────────────────────────────────────────────────────

/// Errors that can occur during MCP client operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// Discovery URL or call arguments are unusable before any I/O happens.
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    /// The request never produced an HTTP response.
    #[error("transport error calling {url}: {reason}")]
    Transport {
        url: String,
        failure: TransportFailure,
        reason: String,
    },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status} calling {url} -> {body}")]
    HttpStatus {
        url: String,
        status: u16,
        body: String,
    },

    /// The response could not be read as a JSON-RPC envelope.
    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    /// Server returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    ServerError {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Every scheme candidate failed during the handshake.
    #[error("Unable to connect via MCP. Tried: [{}]. Last error: {last_error}", .attempted.join(", "))]
    ConnectExhausted {
        attempted: Vec<String>,
        last_error: String,
    },

    /// An overall deadline wrapped around a multi-step operation elapsed.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
}

impl McpError {
    /// Human-readable message with distinct labels for DNS, refused
    /// connections and timeouts.
    pub fn friendly_message(&self) -> String {
        match self {
            McpError::Transport { failure, .. } => match failure.label() {
                Some(label) => label.to_string(),
                None => self.to_string(),
            },
            McpError::Timeout { .. } => "Connection timed out".to_string(),
            _ => self.to_string(),
        }
    }

    /// True when the failure happened before any HTTP response arrived.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, McpError::Transport { .. } | McpError::Timeout { .. })
    }
}

/// Message safe to persist on a record: the error text, or the type name
/// when the text is blank.
pub fn safe_message<E: std::fmt::Display>(err: &E) -> String {
    let text = err.to_string();
    if text.trim().is_empty() {
        let full = std::any::type_name::<E>();
        full.rsplit("::").next().unwrap_or(full).to_string()
    } else {
        text
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
