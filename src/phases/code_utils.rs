//! Code extraction from LLM responses.

use once_cell::sync::Lazy;
use regex::Regex;

static CODE_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<code>(.*?)</code>").unwrap()
});

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[a-zA-Z0-9_+\-]*\r?\n(.*?)```").unwrap()
});

/// Extract generated code from a response.
///
/// Tries, in order: a `<code>…</code>` delimiter, then a markdown fenced
/// block with an optional language tag. The extracted text is trimmed but
/// otherwise verbatim.
pub fn extract_code(text: &str) -> Option<String> {
    if let Some(captures) = CODE_TAG.captures(text) {
        return Some(captures[1].trim().to_string());
    }

    FENCED_BLOCK
        .captures(text)
        .map(|captures| captures[1].trim().to_string())
}
