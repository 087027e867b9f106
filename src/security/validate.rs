//! Input validation for slugs, methods, targets, and headers.
//!
//! # Responsibilities
//! - Slug syntax check (character class, length)
//! - Injection-pattern screening of method and target strings
//! - Header allow/deny filter before forwarding
//!
//! # Design Decisions
//! - Fail closed: reject on any check failure
//! - Header names keep their original case; only hop-by-hop and
//!   framing-sensitive names are dropped
//! - Patterns are compiled once and shared

use regex::Regex;
use std::sync::LazyLock;

/// The one slug the broker itself answers on.
pub const RESERVED_SLUG: &str = "status";

/// Maximum slug length in bytes.
pub const MAX_SLUG_LEN: usize = 50;

/// Hop-by-hop and framing-sensitive header names, never forwarded.
const BLOCKED_HEADERS: [&str; 10] = [
    "host",
    "content-length",
    "transfer-encoding",
    "connection",
    "upgrade",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
];

static INJECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)<script",
        r"(?i)javascript:",
        r"(?i)on\w+\s*=",
        r"(?i)eval\s*\(",
        r"(?i)expression\s*\(",
        r"(?i)vbscript:",
        r"(?i)data:text/html",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("injection pattern must compile"))
    .collect()
});

/// Check slug syntax: `[A-Za-z0-9_-]`, length 1..=50.
pub fn valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= MAX_SLUG_LEN
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Check a string against the injection pattern set.
pub fn suspicious(text: &str) -> bool {
    INJECTION_PATTERNS.iter().any(|p| p.is_match(text))
}

/// Filter a header list for forwarding.
///
/// Drops blocked names (case-insensitive) and any header whose value fails
/// the injection screen. Surviving headers keep their original name case.
pub fn sanitize_headers(headers: Vec<(String, String)>) -> Vec<(String, String)> {
    headers
        .into_iter()
        .filter(|(name, value)| {
            let lower = name.to_ascii_lowercase();
            !BLOCKED_HEADERS.contains(&lower.as_str()) && !suspicious(value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_length_boundaries() {
        assert!(!valid_slug(""));
        assert!(valid_slug("a"));
        assert!(valid_slug(&"a".repeat(50)));
        assert!(!valid_slug(&"a".repeat(51)));
    }

    #[test]
    fn test_slug_character_class() {
        assert!(valid_slug("my-Service_01"));
        assert!(!valid_slug("my service"));
        assert!(!valid_slug("my/service"));
        assert!(!valid_slug("status/anything"));
        assert!(!valid_slug("svc."));
    }

    #[test]
    fn test_injection_patterns() {
        assert!(suspicious("<script>alert(1)</script>"));
        assert!(suspicious("<SCRIPT src=x>"));
        assert!(suspicious("javascript:void(0)"));
        assert!(suspicious("onload = steal()"));
        assert!(suspicious("eval (code)"));
        assert!(suspicious("expression(alert)"));
        assert!(suspicious("VBScript:run"));
        assert!(suspicious("data:text/html,<h1>x</h1>"));

        assert!(!suspicious("GET"));
        assert!(!suspicious("/svc-a?x=1"));
        assert!(!suspicious("application/json"));
    }

    #[test]
    fn test_header_filter_drops_hop_by_hop() {
        let headers = vec![
            ("Host".to_string(), "example.com".to_string()),
            ("Content-Length".to_string(), "12".to_string()),
            ("Transfer-Encoding".to_string(), "chunked".to_string()),
            ("X-Custom".to_string(), "keep-me".to_string()),
        ];
        let out = sanitize_headers(headers);
        assert_eq!(out, vec![("X-Custom".to_string(), "keep-me".to_string())]);
    }

    #[test]
    fn test_header_filter_drops_suspicious_values() {
        let headers = vec![
            ("X-Evil".to_string(), "<script>x</script>".to_string()),
            ("Accept".to_string(), "text/plain".to_string()),
        ];
        let out = sanitize_headers(headers);
        assert_eq!(out, vec![("Accept".to_string(), "text/plain".to_string())]);
    }

    #[test]
    fn test_header_filter_preserves_original_case() {
        let headers = vec![("X-MiXeD-CaSe".to_string(), "v".to_string())];
        let out = sanitize_headers(headers);
        assert_eq!(out[0].0, "X-MiXeD-CaSe");
    }

    #[test]
    fn test_header_filter_is_idempotent() {
        let headers = vec![
            ("Connection".to_string(), "keep-alive".to_string()),
            ("X-One".to_string(), "1".to_string()),
            ("X-Bad".to_string(), "javascript:x".to_string()),
            ("Accept".to_string(), "*/*".to_string()),
        ];
        let once = sanitize_headers(headers);
        let twice = sanitize_headers(once.clone());
        assert_eq!(once, twice);
    }
}
