//! Best-effort extraction of structured data from model output.
//!
//! Models wrap JSON in code fences or chat filler more often than not.
//! The contract here is strict: one direct parse, one repair pass over the
//! stripped text, then failure.

use regex::Regex;
use serde_json::Value;

use super::{AgentError, Result};

/// Parse model output as JSON, repairing common wrapping artifacts once.
pub fn extract_json(raw: &str) -> Result<Value> {
    let trimmed = raw.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    let repaired = strip_wrapping(trimmed);
    serde_json::from_str::<Value>(&repaired).map_err(|e| {
        AgentError::MalformedResponse(format!("{} (after repair pass)", e))
    })
}

/// Remove code fences and any leading/trailing text outside the outermost
/// JSON object or array.
fn strip_wrapping(text: &str) -> String {
    // Fenced block takes priority: its body is the model's intended payload.
    let fence = Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap();
    let body = match fence.captures(text) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(text),
        None => text,
    };

    // Trim to the outermost brace/bracket pair.
    let open_obj = body.find('{');
    let open_arr = body.find('[');
    let (open, close) = match (open_obj, open_arr) {
        (Some(o), Some(a)) if a < o => (a, body.rfind(']')),
        (Some(o), _) => (o, body.rfind('}')),
        (None, Some(a)) => (a, body.rfind(']')),
        (None, None) => return body.to_string(),
    };

    match close {
        Some(end) if end > open => body[open..=end].to_string(),
        _ => body.to_string(),
    }
}
