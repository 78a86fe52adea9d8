//! Maps heterogeneous `tools/list` results onto [`ToolDefinition`].
//!
//! Total by construction: malformed entries are skipped, never reported.

use serde_json::Value;

use super::document::{Document, ARGUMENT_SCHEMA_ALIASES};
use super::types::ToolDefinition;

/// Normalize a raw `tools/list` result (or a stored server document).
///
/// The tool array is either the value itself or the value under `tools`.
pub fn normalize(raw: &Value) -> Vec<ToolDefinition> {
    let entries = match raw {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("tools") {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    entries.iter().filter_map(normalize_entry).collect()
}

/// Normalize and fill absent versions with `fallback_version`.
pub fn normalize_with_version(raw: &Value, fallback_version: Option<&str>) -> Vec<ToolDefinition> {
    let fallback = fallback_version
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    normalize(raw)
        .into_iter()
        .map(|mut tool| {
            if tool.version.is_none() {
                tool.version = fallback.clone();
            }
            tool
        })
        .collect()
}

fn normalize_entry(entry: &Value) -> Option<ToolDefinition> {
    if !entry.is_object() {
        return None;
    }
    let doc = Document::new(entry);
    let name = doc.text("name")?;

    Some(ToolDefinition {
        name,
        description: doc.text("description"),
        version: doc.text("version"),
        arguments: doc.first_present(ARGUMENT_SCHEMA_ALIASES).cloned(),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
