//! Strict parsing of backend output

use crate::backend::{BackendError, BackendResult};
use serde::de::DeserializeOwned;

/// Removes one surrounding markdown code fence, if present
///
/// ```
/// use catalog_harvest::backend::parse::strip_code_fences;
///
/// assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
/// assert_eq!(strip_code_fences("  plain  "), "plain");
/// ```
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();

    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string (`json`, `python`...) on the opening line
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };

    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Parses backend output as a JSON document of type `T`
///
/// Only a surrounding code fence is tolerated; prose around the JSON is a
/// parse failure.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> BackendResult<T> {
    let body = strip_code_fences(text);
    if body.is_empty() {
        return Err(BackendError::EmptyResponse);
    }
    serde_json::from_str(body).map_err(|e| BackendError::Malformed(e.to_string()))
}

/// Answer to the forced binary page-type prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLabel {
    ProductListing,
    Navigation,
}

/// Parses the literal `PRODUCT_LISTING` / `NAVIGATION` token
///
/// Case, surrounding quotes, backticks and a trailing period are ignored.
/// Anything else, including an answer naming both tokens, is rejected.
pub fn parse_page_label(text: &str) -> Option<PageLabel> {
    let token = strip_code_fences(text)
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.' || c.is_whitespace())
        .to_uppercase();

    match token.as_str() {
        "PRODUCT_LISTING" => Some(PageLabel::ProductListing),
        "NAVIGATION" => Some(PageLabel::Navigation),
        _ => None,
    }
}
