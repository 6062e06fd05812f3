//! Feature Extractor
//!
//! Turns a decoded request (method-agnostic: target, body, optional headers)
//! into the fixed six-count feature vector the classifier consumes.
//!
//! Counting runs over percent-decoded text. Decoding is best-effort: an
//! un-decodable `%XX` sequence passes through unchanged, extraction never
//! fails.

use std::collections::BTreeMap;

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

/// Fixed suspicious-token list. Occurrences are counted independently per
/// token; overlap between tokens (e.g. `--` also feeding `dashes`) is
/// expected and double counted.
pub const SUSPICIOUS_TOKENS: &[&str] = &[
    "sleep", "drop", "uid", "select", "waitfor", "delay", "system", "union",
    "order by", "group by", "insert", "update", "delete", "benchmark",
    "and 1=1", "or 1=1", "--", "#",
];

/// Number of features in the vector
pub const FEATURE_COUNT: usize = 6;

/// Six non-negative counts computed over the combined decoded text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Count of `'`
    pub single_q: u32,
    /// Count of `"`
    pub double_q: u32,
    /// Count of the two-character sequence `--` (non-overlapping)
    pub dashes: u32,
    /// Count of `(`
    pub braces: u32,
    /// Count of space characters
    pub spaces: u32,
    /// Summed case-insensitive occurrences of [`SUSPICIOUS_TOKENS`]
    pub suspicious: u32,
}

impl FeatureVector {
    /// Values in layout order, as the scoring input.
    pub fn as_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.single_q as f64,
            self.double_q as f64,
            self.dashes as f64,
            self.braces as f64,
            self.spaces as f64,
            self.suspicious as f64,
        ]
    }
}

/// Percent-decode a segment, passing through malformed sequences unchanged.
fn decode(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// Fold a header mapping into countable text: `key:value` pairs joined by
/// spaces, values decoded like any other segment.
fn header_blob(headers: &BTreeMap<String, String>) -> String {
    headers
        .iter()
        .map(|(k, v)| format!("{}:{}", k, decode(v)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the combined decoded text the counts run over.
///
/// Target and body are decoded and joined by a single space; the header
/// blob is appended only when requested. Leading/trailing whitespace is
/// trimmed so absent segments do not shift the space count.
pub fn combined_text(
    target: &str,
    body: &str,
    headers: Option<&BTreeMap<String, String>>,
) -> String {
    let decoded_target = decode(target);
    let decoded_body = decode(body);
    let blob = headers.map(header_blob).unwrap_or_default();

    format!("{} {} {}", decoded_target, decoded_body, blob)
        .trim()
        .to_string()
}

/// Count occurrences of every suspicious token in already-lowercased text.
fn count_suspicious(lowered: &str) -> u32 {
    SUSPICIOUS_TOKENS
        .iter()
        .map(|token| lowered.matches(token).count() as u32)
        .sum()
}

/// Extract the feature vector for a request.
///
/// `headers` participates only when the caller opts in (the blocking
/// pipeline excludes headers by default, see `Config::include_headers`).
/// Identical decoded text always yields identical counts.
pub fn extract(
    target: &str,
    body: &str,
    headers: Option<&BTreeMap<String, String>>,
) -> FeatureVector {
    let combined = combined_text(target, body, headers);
    let lowered = combined.to_lowercase();

    FeatureVector {
        single_q: combined.matches('\'').count() as u32,
        double_q: combined.matches('"').count() as u32,
        dashes: combined.matches("--").count() as u32,
        braces: combined.matches('(').count() as u32,
        spaces: combined.matches(' ').count() as u32,
        suspicious: count_suspicious(&lowered),
    }
}

/// Suspicious tokens present in the combined text, for explanations.
pub fn matched_tokens(
    target: &str,
    body: &str,
    headers: Option<&BTreeMap<String, String>>,
) -> Vec<&'static str> {
    let lowered = combined_text(target, body, headers).to_lowercase();
    SUSPICIOUS_TOKENS
        .iter()
        .copied()
        .filter(|token| lowered.contains(token))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_quote_only() {
        let v = extract("/a'b", "", None);
        assert_eq!(v.single_q, 1);
        assert_eq!(v.double_q, 0);
        assert_eq!(v.dashes, 0);
        assert_eq!(v.braces, 0);
        assert_eq!(v.spaces, 0);
        assert_eq!(v.suspicious, 0);
    }

    #[test]
    fn sql_injection_path() {
        let v = extract("/login?user=admin' OR '1'='1", "", None);
        assert_eq!(v.single_q, 4);
        assert_eq!(v.spaces, 2);
        // "or 1=1" does not literally occur (quotes intervene), "uid" absent
        assert_eq!(v.suspicious, 0);
    }

    #[test]
    fn percent_decoding_applies_before_counting() {
        // %27 = ', %20 = space
        let v = extract("/q=%27%20union%20select%27", "", None);
        assert_eq!(v.single_q, 2);
        assert_eq!(v.spaces, 2);
        // "union" + "select"
        assert_eq!(v.suspicious, 2);
    }

    #[test]
    fn malformed_percent_sequences_pass_through() {
        let v = extract("/a%zz%2", "", None);
        // nothing decodable, nothing dropped
        assert_eq!(v.spaces, 0);
        assert_eq!(combined_text("/a%zz%2", "", None), "/a%zz%2");
    }

    #[test]
    fn dashes_count_is_non_overlapping_and_double_counted_as_token() {
        let v = extract("/x", "1' -- comment", None);
        assert_eq!(v.dashes, 1);
        // "--" is also on the token list
        assert_eq!(v.suspicious, 1);
    }

    #[test]
    fn token_counting_is_case_insensitive() {
        let v = extract("/q", "UNION SELECT sleep(5)", None);
        // union, select, sleep
        assert_eq!(v.suspicious, 3);
        assert_eq!(v.braces, 1);
    }

    #[test]
    fn empty_fields_are_empty_strings() {
        let v = extract("", "", None);
        assert_eq!(v, FeatureVector::default());
    }

    #[test]
    fn headers_fold_in_only_when_provided() {
        let mut headers = BTreeMap::new();
        headers.insert("x-probe".to_string(), "' or 1=1".to_string());

        let without = extract("/q", "", None);
        let with = extract("/q", "", Some(&headers));

        assert_eq!(without.single_q, 0);
        assert_eq!(with.single_q, 1);
        assert!(with.suspicious > without.suspicious);
    }

    #[test]
    fn determinism() {
        let a = extract("/q=%27x", "body text", None);
        let b = extract("/q=%27x", "body text", None);
        assert_eq!(a, b);
    }

    #[test]
    fn matched_tokens_reports_present_tokens() {
        let tokens = matched_tokens("/q", "union select benchmark(1)", None);
        assert!(tokens.contains(&"union"));
        assert!(tokens.contains(&"select"));
        assert!(tokens.contains(&"benchmark"));
        assert!(!tokens.contains(&"waitfor"));
    }
}
