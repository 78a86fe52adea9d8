//! Event-stream body decoding.
//!
//! A streamable-HTTP MCP server may answer a POST with a complete
//! `text/event-stream` body instead of plain JSON. Frames are `data:` lines
//! terminated by a blank line; the last frame that parses is authoritative.

use serde_json::Value;

/// Sentinel some servers emit after the final frame.
const DONE_SENTINEL: &str = "[DONE]";

/// Prefixes that mark a body as event-stream framed when the content type
/// is missing or wrong.
const EVENT_STREAM_PREFIXES: &[&str] = &["event:", "data:", "id:"];

/// Whether a body looks like an event stream regardless of content type.
pub fn looks_like_event_stream(body: &str) -> bool {
    let trimmed = body.trim_start();
    EVENT_STREAM_PREFIXES.iter().any(|p| trimmed.starts_with(p))
}

/// Extract the last well-formed JSON payload from an event-stream body.
///
/// Consecutive `data:` lines are joined with `\n` into one frame. A blank
/// line closes the frame. `[DONE]` frames and frames that fail to parse are
/// skipped. Returns `None` when no frame parsed; callers treat that as a
/// failure.
pub fn extract_json(body: &str) -> Option<Value> {
    let mut last_good: Option<Value> = None;
    let mut buffer = String::new();

    // `lines()` also splits on CRLF.
    for line in body.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            let data = rest.trim();
            if !data.is_empty() {
                if !buffer.is_empty() {
                    buffer.push('\n');
                }
                buffer.push_str(data);
            }
            continue;
        }

        if line.trim().is_empty() && !buffer.is_empty() {
            if let Some(value) = parse_frame(&buffer) {
                last_good = Some(value);
            }
            buffer.clear();
        }
        // `event:`, `id:`, `retry:` and comment lines carry no payload.
    }

    if !buffer.is_empty() {
        if let Some(value) = parse_frame(&buffer) {
            last_good = Some(value);
        }
    }

    last_good
}

fn parse_frame(frame: &str) -> Option<Value> {
    let frame = frame.trim();
    if frame == DONE_SENTINEL {
        return None;
    }
    serde_json::from_str(frame).ok()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
