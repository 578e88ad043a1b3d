//! Lenient decoding of JSON from completion output.
//!
//! Models asked for "JSON only" still wrap output in markdown fences or add
//! leading commentary. Recovery follows a defined fallback order: direct
//! parse, fence-strip and retry, balanced-brace span extraction and retry,
//! then fail.

use once_cell::sync::Lazy;
use regex::Regex;

/// Decode a JSON object from raw completion text.
pub fn decode_lenient(raw: &str) -> Result<serde_json::Value, String> {
    let trimmed = raw.trim();

    // 1. Direct parse
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    // 2. Strip markdown code fences and retry
    static FENCE_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap());
    if let Some(caps) = FENCE_RE.captures(trimmed) {
        let inner = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        if let Ok(value) = serde_json::from_str(inner) {
            return Ok(value);
        }
    }

    // 3. Extract the first balanced {...} span and retry
    if let Some(span) = balanced_object_span(trimmed) {
        if let Ok(value) = serde_json::from_str(span) {
            return Ok(value);
        }
    }

    let preview: String = trimmed.chars().take(120).collect();
    Err(format!("no parseable JSON object in output: {preview:?}"))
}

/// Find the first balanced `{...}` span, honoring JSON string literals and
/// escapes so braces inside strings don't throw the count off.
fn balanced_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    None
}
