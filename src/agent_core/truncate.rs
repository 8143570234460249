//! Byte-bounded truncation for log lines and tool results.
//!
//! Tool results are measured as the JSON the model will actually receive,
//! so the preview budget accounts for escaping and the envelope keys.

use serde_json::{json, Value};

use crate::tools::ToolResult;

/// Longest prefix of `s` that fits in `max_bytes` on a char boundary.
pub(crate) fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Replace an oversized result with a preview, keeping `success`.
///
/// The returned result serializes to at most `max_bytes` whenever
/// `max_bytes` can hold the envelope itself.
pub(crate) fn truncate_tool_result(
    result: ToolResult,
    tool_name: &str,
    max_bytes: usize,
) -> ToolResult {
    let serialized = result.to_value().to_string();
    if serialized.len() <= max_bytes {
        return result;
    }

    let envelope = |preview: &str| {
        let mut payload = serde_json::Map::new();
        payload.insert("truncated".into(), Value::Bool(true));
        payload.insert("originalBytes".into(), json!(serialized.len()));
        payload.insert("preview".into(), Value::String(preview.to_string()));
        ToolResult {
            success: result.success,
            payload,
        }
    };

    let overhead = envelope("").to_value().to_string().len();
    let preview = truncate_escaped(&serialized, max_bytes.saturating_sub(overhead));

    tracing::warn!(
        tool = %tool_name,
        original_len = serialized.len(),
        preview_len = preview.len(),
        max_bytes,
        "tool result truncated"
    );

    envelope(preview)
}

/// Longest prefix of `s` whose JSON string encoding (quotes excluded) fits
/// in `budget` bytes.
fn truncate_escaped(s: &str, budget: usize) -> &str {
    let mut used = 0;
    for (idx, c) in s.char_indices() {
        used += escaped_len(c);
        if used > budget {
            return &s[..idx];
        }
    }
    s
}

/// Bytes `c` occupies inside a serde_json string literal.
fn escaped_len(c: char) -> usize {
    match c {
        '"' | '\\' | '\n' | '\r' | '\t' | '\u{08}' | '\u{0c}' => 2,
        c if (c as u32) < 0x20 => 6,
        c => c.len_utf8(),
    }
}
