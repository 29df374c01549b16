//! Locating the structured payload inside a raw model response.
//!
//! Responses arrive as free-text analysis followed by a JSON block,
//! but models routinely wrap the block in markdown fences, leak control
//! characters into strings, or drop the delimiters entirely. Extraction
//! tries the declared markers first and falls back to scanning for the
//! first balanced JSON object.

use lazy_static::lazy_static;
use regex::Regex;

const JSON_START_MARKER: &str = "---JSON_DATA_START---";

lazy_static! {
    static ref MARKER_BLOCK: Regex =
        Regex::new(r"(?s)---JSON_DATA_START---\s*(.*?)\s*---JSON_DATA_END---")
            .expect("marker regex");
    static ref CODE_FENCE_OPEN: Regex = Regex::new(r"^\s*```[\w-]*\s*").expect("fence regex");
    static ref CODE_FENCE_CLOSE: Regex = Regex::new(r"\s*```\s*$").expect("fence regex");
}

/// The two halves of a model response: the free-text narrative section
/// and the structured JSON payload, when one could be located.
#[derive(Debug, Clone)]
pub struct SplitResponse {
    pub narrative: String,
    pub json: Option<String>,
}

/// Split a raw response into narrative text and JSON payload.
pub fn split_response(raw: &str) -> SplitResponse {
    let narrative = raw
        .split(JSON_START_MARKER)
        .next()
        .unwrap_or(raw)
        .trim()
        .to_string();

    SplitResponse {
        narrative,
        json: extract_json(raw),
    }
}

fn extract_json(raw: &str) -> Option<String> {
    if let Some(captures) = MARKER_BLOCK.captures(raw) {
        let block = strip_fences(captures.get(1).map(|m| m.as_str()).unwrap_or(""));
        let block = scrub_control_chars(&block);
        if serde_json::from_str::<serde_json::Value>(&block).is_ok() {
            return Some(block);
        }
        // Models sometimes leave prose inside the markers ("Here is the
        // data: {...}"); salvage the embedded object before giving up on
        // the block.
        if let Some(object) = first_balanced_object(&block) {
            if serde_json::from_str::<serde_json::Value>(object).is_ok() {
                return Some(object.to_string());
            }
        }
    }

    let cleaned = scrub_control_chars(raw);
    if let Some(object) = first_balanced_object(&cleaned) {
        return Some(object.to_string());
    }

    // Last resort: the whole response may already be bare JSON.
    let trimmed = cleaned.trim().to_string();
    if serde_json::from_str::<serde_json::Value>(&trimmed).is_ok() {
        return Some(trimmed);
    }

    None
}

fn strip_fences(block: &str) -> String {
    let without_open = CODE_FENCE_OPEN.replace(block, "");
    CODE_FENCE_CLOSE.replace(&without_open, "").to_string()
}

/// Replace ASCII control characters with spaces; models leak raw
/// newlines and tabs into JSON string values, which strict JSON rejects.
fn scrub_control_chars(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii_control() { ' ' } else { c })
        .collect()
}

/// First `{ ... }` span with balanced braces, ignoring braces inside
/// string literals.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
