//! Best-effort recovery of JSON embedded in free-form LLM output.
//!
//! LLM responses frequently wrap JSON in markdown fences, prose, or emit
//! several objects back to back. This module scans for balanced object and
//! array boundaries (tracking string and escape state, so braces inside
//! string literals do not confuse the scan) and validates each candidate
//! with a strict `serde_json` parse.
//!
//! This is a best-effort recovery pass, not a JSON parser: anything the
//! strict parse rejects is skipped, and unbalanced trailing fragments are
//! dropped.

use serde_json::Value;

/// Strip a surrounding markdown code fence, if present.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();

    for prefix in ["```json", "```"] {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            if let Some(inner) = rest.rsplit_once("```") {
                return inner.0.trim();
            }
            return rest.trim();
        }
    }

    trimmed
}

/// Find the byte offset one past the closer balancing the opener at
/// `start`. Returns `None` when the text ends before the structure closes.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let open = bytes[start];
    debug_assert!(open == b'{' || open == b'[');

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + offset + ch.len_utf8());
                }
            }
            _ => {}
        }
    }

    None
}

/// Extract the first parseable JSON object or array from the text.
pub fn first_json_value(text: &str) -> Option<Value> {
    let text = strip_code_fences(text);

    let mut pos = 0;
    while let Some(rel) = text[pos..].find(['{', '[']) {
        let start = pos + rel;
        if let Some(end) = balanced_end(text, start) {
            if let Ok(value) = serde_json::from_str::<Value>(&text[start..end]) {
                return Some(value);
            }
            // Candidate was balanced but invalid; resume after its opener
        }
        pos = start + 1;
    }

    None
}

/// Extract the first parseable JSON object (not array) from the text.
pub fn first_json_object(text: &str) -> Option<Value> {
    let text = strip_code_fences(text);

    let mut pos = 0;
    while let Some(rel) = text[pos..].find('{') {
        let start = pos + rel;
        if let Some(end) = balanced_end(text, start) {
            if let Ok(value) = serde_json::from_str::<Value>(&text[start..end]) {
                return Some(value);
            }
        }
        pos = start + 1;
    }

    None
}

/// Extract every top-level JSON object found in the text, in order.
///
/// A top-level array of objects is flattened into its elements, matching
/// the shape generation prompts ask for.
pub fn extract_json_objects(text: &str) -> Vec<Value> {
    let text = strip_code_fences(text);
    let mut objects = Vec::new();

    let mut pos = 0;
    while pos < text.len() {
        let Some(rel) = text[pos..].find(['{', '[']) else {
            break;
        };
        let start = pos + rel;

        match balanced_end(text, start) {
            Some(end) => {
                match serde_json::from_str::<Value>(&text[start..end]) {
                    Ok(Value::Array(items)) => {
                        objects.extend(items.into_iter().filter(|v| v.is_object()));
                        pos = end;
                    }
                    Ok(value @ Value::Object(_)) => {
                        objects.push(value);
                        pos = end;
                    }
                    Ok(_) => pos = end,
                    Err(_) => pos = start + 1,
                }
            }
            None => pos = start + 1,
        }
    }

    objects
}
