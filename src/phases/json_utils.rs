//! JSON extraction utilities for parsing LLM responses.

use serde_json::Value;

/// Extract a JSON block from LLM response text.
///
/// Handles two common patterns:
/// 1. JSON wrapped in ```json ... ``` code blocks
/// 2. Raw JSON objects (finds first { to last })
pub fn extract_json_block(text: &str) -> Option<&str> {
    // Look for ```json ... ``` blocks
    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return Some(text[content_start..content_start + end].trim());
        }
    }

    // Try finding raw JSON object
    if let Some(start) = text.find('{')
        && let Some(end) = text.rfind('}')
    {
        return Some(&text[start..=end]);
    }

    None
}

/// Parse an LLM response into a JSON object, tolerating chatter around it.
///
/// Tries a direct parse first, then [`extract_json_block`]. Returns `None`
/// rather than erroring when nothing parses; callers fall back to defaults.
pub fn parse_json_lenient(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text)
        && value.is_object()
    {
        return Some(value);
    }

    let block = extract_json_block(text)?;
    serde_json::from_str::<Value>(block)
        .ok()
        .filter(|v| v.is_object())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_code_block() {
        let text = r#"Here's the response:
```json
{"key": "value"}
```
"#;
        assert_eq!(extract_json_block(text), Some(r#"{"key": "value"}"#));
    }

    #[test]
    fn test_extract_raw_json() {
        let text = r#"Some text before {"key": "value"} and after"#;
        assert_eq!(extract_json_block(text), Some(r#"{"key": "value"}"#));
    }

    #[test]
    fn test_extract_nested_json() {
        let text = r#"{"outer": {"inner": "value"}}"#;
        assert_eq!(
            extract_json_block(text),
            Some(r#"{"outer": {"inner": "value"}}"#)
        );
    }

    #[test]
    fn test_no_json() {
        let text = "Just plain text without any JSON";
        assert_eq!(extract_json_block(text), None);
    }

    #[test]
    fn test_lenient_parse_direct() {
        let value = parse_json_lenient(r#"{"shouldRetry": false, "reasoning": "done"}"#).unwrap();
        assert_eq!(value["shouldRetry"], false);
    }

    #[test]
    fn test_lenient_parse_with_chatter() {
        let text = "Sure! Here is my verdict:\n```json\n{\"shouldRetry\": true}\n```\nLet me know.";
        let value = parse_json_lenient(text).unwrap();
        assert_eq!(value["shouldRetry"], true);
    }

    #[test]
    fn test_lenient_parse_rejects_non_objects() {
        assert!(parse_json_lenient("[1, 2, 3]").is_none());
        assert!(parse_json_lenient("plain words").is_none());
    }
}
