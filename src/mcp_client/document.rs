//! Lookups over loosely-shaped JSON documents.
//!
//! Upstream servers disagree on field naming, so every alias the client
//! recognizes is declared here as a constant list instead of being spread
//! across ad hoc `.get()` chains.

use serde_json::Value;

/// Dotted paths searched in an `initialize` result for a session token.
pub const SESSION_ID_PATHS: &[&str] = &[
    "sessionId",
    "session_id",
    "session.id",
    "transport.sessionId",
    "transport.session_id",
];

/// Field names that may carry a tool's argument schema, in priority order.
pub const ARGUMENT_SCHEMA_ALIASES: &[&str] = &["arguments", "inputSchema", "paramsSchema", "parameters"];

/// Borrowed view over a JSON value with path and alias helpers.
#[derive(Debug, Clone, Copy)]
pub struct Document<'a>(&'a Value);

impl<'a> Document<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self(value)
    }

    /// Resolve a dotted path (`transport.sessionId`). JSON `null` counts as
    /// absent.
    pub fn get_path(&self, path: &str) -> Option<&'a Value> {
        let mut current = self.0;
        for segment in path.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        if current.is_null() {
            None
        } else {
            Some(current)
        }
    }

    /// The first path that resolves to a non-null value.
    pub fn first_present(&self, paths: &[&str]) -> Option<&'a Value> {
        paths.iter().find_map(|p| self.get_path(p))
    }

    /// The first path holding a non-blank JSON string, trimmed. Numbers and
    /// booleans do not count.
    pub fn first_string(&self, paths: &[&str]) -> Option<String> {
        paths.iter().find_map(|p| {
            self.get_path(p)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
    }

    /// Text at `path`, trimmed; blank becomes `None`.
    pub fn text(&self, path: &str) -> Option<String> {
        self.get_path(path).and_then(scalar_text)
    }
}

/// Trimmed textual form of a scalar. Strings, numbers and booleans are
/// usable; objects, arrays, null and blank strings are not.
pub fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_path_nested() {
        let v = json!({"transport": {"sessionId": "abc"}});
        let doc = Document::new(&v);
        assert_eq!(doc.get_path("transport.sessionId"), Some(&json!("abc")));
        assert!(doc.get_path("transport.missing").is_none());
        assert!(doc.get_path("transport.sessionId.deeper").is_none());
    }

    #[test]
    fn test_null_is_absent() {
        let v = json!({"arguments": null, "inputSchema": {"type": "object"}});
        let doc = Document::new(&v);
        assert_eq!(
            doc.first_present(ARGUMENT_SCHEMA_ALIASES),
            Some(&json!({"type": "object"}))
        );
    }

    #[test]
    fn test_first_string_skips_blank_and_objects() {
        let v = json!({"sessionId": "  ", "session_id": {"x": 1}, "session": {"id": "s-9"}});
        let doc = Document::new(&v);
        assert_eq!(doc.first_string(SESSION_ID_PATHS), Some("s-9".to_string()));
    }

    #[test]
    fn test_first_string_ignores_numbers_and_booleans() {
        let v = json!({"sessionId": 42, "session_id": true, "transport": {"sessionId": " t-1 "}});
        let doc = Document::new(&v);
        assert_eq!(doc.first_string(SESSION_ID_PATHS), Some("t-1".to_string()));

        let numeric_only = json!({"sessionId": 42});
        assert_eq!(Document::new(&numeric_only).first_string(SESSION_ID_PATHS), None);
    }

    #[test]
    fn test_scalar_text() {
        assert_eq!(scalar_text(&json!(" x ")), Some("x".into()));
        assert_eq!(scalar_text(&json!(5)), Some("5".into()));
        assert_eq!(scalar_text(&json!(true)), Some("true".into()));
        assert_eq!(scalar_text(&json!([])), None);
        assert_eq!(scalar_text(&json!("")), None);
    }
}
