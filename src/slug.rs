//! Slug generation for agent directory names.

use once_cell::sync::Lazy;
use regex::Regex;

/// Hard cap on slug length; slugs become directory names
const MAX_SLUG_LENGTH: usize = 40;

static NON_ALNUM_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Reduce a name to a lowercase ASCII slug.
///
/// Any run of characters outside `[a-z0-9]` (after lowercasing) collapses to
/// a single hyphen; non-ASCII letters are folded away rather than kept, so
/// the result is always safe as a directory name on every platform.
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    NON_ALNUM_RUN
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// Slugify and cap the length, keeping only whole words.
///
/// Words are dropped from the end until the slug fits; a single overlong
/// word is hard-truncated instead. Used when an agent name is derived from a
/// free-form task description.
pub fn slugify_truncate(name: &str) -> String {
    let full = slugify(name);
    if full.len() <= MAX_SLUG_LENGTH {
        return full;
    }

    let mut fitted = String::new();
    for word in full.split('-') {
        let needed = if fitted.is_empty() {
            word.len()
        } else {
            fitted.len() + 1 + word.len()
        };
        if needed > MAX_SLUG_LENGTH {
            break;
        }
        if !fitted.is_empty() {
            fitted.push('-');
        }
        fitted.push_str(word);
    }

    if fitted.is_empty() {
        // First word alone exceeds the cap; slugs are ASCII so byte
        // truncation is safe
        full[..MAX_SLUG_LENGTH].trim_end_matches('-').to_string()
    } else {
        fitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_collapses_separator_runs() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("Test 123!"), "test-123");
        assert_eq!(slugify("  Multiple   Spaces  "), "multiple-spaces");
        assert_eq!(slugify("a__b--c..d"), "a-b-c-d");
    }

    #[test]
    fn test_slugify_folds_non_ascii() {
        assert_eq!(slugify("café crème"), "caf-cr-me");
        assert_eq!(slugify("数字 agent"), "agent");
    }

    #[test]
    fn test_slugify_truncate_breaks_on_words() {
        let long_name =
            "Fetch the current weather for a list of cities and render an ASCII table";
        let slug = slugify_truncate(long_name);
        assert!(slug.len() <= 40);
        assert!(!slug.ends_with('-'));
        assert_eq!(slug, "fetch-the-current-weather-for-a-list-of");
    }

    #[test]
    fn test_slugify_truncate_hard_truncates_single_long_word() {
        let slug = slugify_truncate(&"x".repeat(80));
        assert_eq!(slug.len(), 40);
    }

    #[test]
    fn test_slugify_truncate_short_input_untouched() {
        assert_eq!(slugify_truncate("fact"), "fact");
    }
}
