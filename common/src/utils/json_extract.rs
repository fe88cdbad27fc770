//! Two-stage JSON extraction for model output.
//!
//! Models occasionally wrap JSON in Markdown fences or prepend prose. The
//! extraction order is: strip fences, trim to the outermost brace pair, parse;
//! callers that still fail may fall back to a balanced-brace scan before
//! surfacing a validation error.

use serde_json::Value;

/// Removes a surrounding Markdown code fence (```json ... ```), if present.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let without_open = trimmed.trim_start_matches('`');
    // Drop an optional language tag on the opening fence line.
    let body = match without_open.split_once('\n') {
        Some((_, rest)) => rest,
        None => without_open,
    };
    body.trim_end_matches('`').trim()
}

/// Substring between the first `{` and the last `}`, inclusive.
pub fn brace_window(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    text.get(start..=end)
}

/// String-aware balanced-brace scan returning the first complete JSON object.
///
/// Used as the last resort after the plain brace window fails, e.g. when the
/// model emits trailing prose containing a stray `}`.
pub fn balanced_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text.get(start..)?.char_indices() {
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
            '{' => depth = depth.saturating_add(1),
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let end = start.saturating_add(offset);
                    return text.get(start..=end).map(str::to_string);
                }
            }
            _ => {}
        }
    }
    None
}

/// First-pass extraction: fences stripped, brace-windowed, parsed.
pub fn extract_json_value(text: &str) -> Option<Value> {
    let stripped = strip_code_fences(text);
    let candidate = brace_window(stripped)?;
    serde_json::from_str(candidate).ok()
}

/// Last-resort extraction via the balanced-brace scanner.
pub fn extract_json_value_balanced(text: &str) -> Option<Value> {
    let stripped = strip_code_fences(text);
    let candidate = balanced_object(stripped)?;
    serde_json::from_str(&candidate).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fenced_blocks() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"a\": 1}");
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn extracts_object_with_surrounding_prose() {
        let text = "Sure! Here you go: {\"message\": \"hi\"} hope that helps";
        let value = extract_json_value(text).expect("object should parse");
        assert_eq!(value["message"], "hi");
    }

    #[test]
    fn brace_window_fails_on_reversed_braces() {
        assert!(brace_window("} nothing {").is_none());
    }

    #[test]
    fn balanced_scan_survives_trailing_brace_noise() {
        let text = "{\"a\": {\"b\": 2}} and then a stray }";
        let candidate = balanced_object(text).expect("balanced object");
        assert_eq!(candidate, "{\"a\": {\"b\": 2}}");
    }

    #[test]
    fn balanced_scan_ignores_braces_inside_strings() {
        let text = "{\"a\": \"literal } brace\"} tail";
        let candidate = balanced_object(text).expect("balanced object");
        let value: Value = serde_json::from_str(&candidate).expect("parses");
        assert_eq!(value["a"], "literal } brace");
    }

    #[test]
    fn plain_window_fails_where_balanced_succeeds() {
        let text = "{\"a\": 1} garbage }";
        assert!(extract_json_value(text).is_none());
        assert!(extract_json_value_balanced(text).is_some());
    }
}
