//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod error;
pub mod retry;

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Normalize a node base URL for de-duplication
///
/// Parsing through `Url` lowercases scheme and host; the trailing slash is
/// stripped so `https://a.example/` and `https://a.example` compare equal.
/// Unparseable input falls back to a trimmed copy.
pub fn normalize_base_url(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(parsed) => parsed.as_str().trim_end_matches('/').to_string(),
        Err(_) => raw.trim().trim_end_matches('/').to_string(),
    }
}

/// Sanitize an opaque identifier for use as a filename component
pub fn sanitize_id(id: &str) -> String {
    static INVALID_CHARS: OnceLock<Regex> = OnceLock::new();

    let re =
        INVALID_CHARS.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]").expect("Invalid regex pattern"));

    re.replace_all(id, "_").to_string()
}

/// Normalize whitespace in text
pub fn normalize_whitespace(text: &str) -> String {
    static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

    let re = WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

    re.replace_all(text.trim(), " ").to_string()
}
