//! Raw source record → canonical [`Candidate`].
//!
//! Canonicalization decodes HTML entities (for sources that deliver encoded
//! titles), strips site boilerplate, collapses whitespace and extracts the
//! error text the source is about. Angle brackets are always kept as text:
//! `Vec<u8>` is an error fragment, not markup.
//! Signals are copied only for fields the record actually carries.

use std::sync::LazyLock;

use errorpress_shared::{Candidate, PressError, Result, Signals, Source};
use regex::Regex;
use scraper::Html;

use crate::RawRecord;

/// Titles at or above this length are not usable as error text on their own.
const MAX_TITLE_AS_ERROR: usize = 100;

/// Error-like fragments searched for in StackOverflow titles, most specific first.
static ERROR_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)ERROR[_\s]+[A-Z_]+[_\s]+\w+",
        r"(?i)0x[0-9A-F]{8}",
        r"(?i)Exception[:\s]+[\w\.]+",
        r"(?i)Failed[:\s]+.+",
        r"(?i)Cannot[:\s]+.+",
        r"(?i)Unable to[:\s]+.+",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid error pattern"))
    .collect()
});

/// Words that mark a Reddit title as an error report.
const REDDIT_ERROR_KEYWORDS: &[&str] = &["error", "failed", "crash", "issue", "problem", "bug"];

static SITE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+[-|–]\s+(stack overflow|super user|server fault|reddit)\s*$")
        .expect("valid suffix regex")
});

static BRACKET_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*[\[(](solved|help|question|urgent|resolved)[\])]\s*:?\s*")
        .expect("valid tag regex")
});

static SUBREDDIT_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*/?r/\w+\s*[:\-]?\s*").expect("valid subreddit regex"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Turn one raw record into a [`Candidate`] with `confidence_score = 0`.
///
/// Fails with [`PressError::MalformedRecord`] when no error text survives
/// canonicalization.
pub fn normalize(record: &RawRecord) -> Result<Candidate> {
    let cleaned = canonicalize(&record.text, record.source);
    let raw_text = match record.source {
        Source::StackOverflow => extract_stackoverflow_error(&cleaned),
        Source::Reddit => extract_reddit_error(&cleaned),
        Source::Trends | Source::Manual => Some(cleaned.clone()),
    }
    .unwrap_or_default();

    if raw_text.is_empty() {
        return Err(PressError::malformed(
            record.source.as_str(),
            format!("no error text in '{}'", truncate(&record.text, 80)),
        ));
    }

    let fingerprint = fingerprint(&raw_text);
    if fingerprint.is_empty() {
        return Err(PressError::malformed(
            record.source.as_str(),
            format!("'{raw_text}' has no alphanumeric content"),
        ));
    }

    let title = (cleaned != raw_text).then_some(cleaned);

    Ok(Candidate {
        raw_text,
        source: record.source,
        source_signals: extract_signals(record),
        confidence_score: 0.0,
        fingerprint,
        source_url: record.url.clone(),
        title,
    })
}

/// Strip site boilerplate and collapse whitespace. Entities are decoded only
/// for StackOverflow and Reddit, whose APIs return encoded titles.
pub fn canonicalize(text: &str, source: Source) -> String {
    let decoded = match source {
        Source::StackOverflow | Source::Reddit => decode_entities(text),
        Source::Trends | Source::Manual => text.to_string(),
    };
    let mut s = SITE_SUFFIX.replace(&decoded, "").into_owned();
    s = BRACKET_TAG.replace(&s, "").into_owned();
    s = SUBREDDIT_PREFIX.replace(&s, "").into_owned();
    collapse_whitespace(&s)
}

/// Normalized comparison key: lowercase, punctuation as spaces, single-spaced.
pub fn fingerprint(text: &str) -> String {
    let mapped: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Entity decoding only. A literal `<` is escaped first so the parser never
/// sees a tag.
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let escaped = text.replace('<', "&lt;");
    let fragment = Html::parse_fragment(&escaped);
    fragment.root_element().text().collect()
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

fn extract_stackoverflow_error(title: &str) -> Option<String> {
    for pattern in ERROR_PATTERNS.iter() {
        if let Some(m) = pattern.find(title) {
            return Some(m.as_str().trim().to_string());
        }
    }
    (title.chars().count() < MAX_TITLE_AS_ERROR).then(|| title.to_string())
}

fn extract_reddit_error(title: &str) -> Option<String> {
    let lower = title.to_lowercase();
    if !REDDIT_ERROR_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return None;
    }
    Some(truncate(title, MAX_TITLE_AS_ERROR))
}

/// Per-source mapping from record fields to signal names.
fn signal_fields(source: Source) -> &'static [(&'static str, &'static str)] {
    match source {
        Source::StackOverflow => &[
            ("score", "vote_count"),
            ("view_count", "view_count"),
            ("answer_count", "answer_count"),
        ],
        Source::Reddit => &[("ups", "vote_count"), ("num_comments", "comment_count")],
        Source::Trends => &[
            ("search_volume", "search_volume"),
            ("trend_score", "trend_score"),
        ],
        Source::Manual => &[],
    }
}

fn extract_signals(record: &RawRecord) -> Signals {
    let mut signals = Signals::new();
    for (field, signal) in signal_fields(record.source) {
        let value = record.fields.get(*field).and_then(serde_json::Value::as_f64);
        if let Some(v) = value.filter(|v| v.is_finite()) {
            signals.insert((*signal).to_string(), v);
        }
    }
    signals
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect::<String>().trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(source: Source, text: &str, fields: serde_json::Value) -> RawRecord {
        RawRecord {
            source,
            text: text.into(),
            url: None,
            fields: fields.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn fingerprint_ignores_case_spacing_and_punctuation() {
        assert_eq!(
            fingerprint("File Not Found 0x80070002"),
            fingerprint("file not found  0x80070002")
        );
        assert_eq!(fingerprint("ERROR_ACCESS_DENIED!"), "error access denied");
        assert_eq!(fingerprint("  ...  "), "");
    }

    #[test]
    fn canonicalize_strips_boilerplate() {
        assert_eq!(
            canonicalize(
                "[Solved] Windows Update fails &amp; hangs - Stack Overflow",
                Source::StackOverflow
            ),
            "Windows Update fails & hangs"
        );
        assert_eq!(
            canonicalize("r/techsupport: PC   crash\n on boot", Source::Reddit),
            "PC crash on boot"
        );
        assert_eq!(
            canonicalize("List&lt;String&gt; is null", Source::StackOverflow),
            "List<String> is null"
        );
    }

    #[test]
    fn angle_brackets_survive_as_text() {
        let manual = normalize(&record(Source::Manual, "expected Vec<u8>, found String", json!({})))
            .expect("normalize");
        assert_eq!(manual.raw_text, "expected Vec<u8>, found String");

        let other = normalize(&record(Source::Manual, "expected Vec<String>, found String", json!({})))
            .expect("normalize");
        assert_ne!(manual.fingerprint, other.fingerprint);

        let term = normalize(&record(Source::Trends, "a<b is false", json!({}))).expect("normalize");
        assert_eq!(term.raw_text, "a<b is false");

        // raw bracket next to an entity in an encoded title
        assert_eq!(
            canonicalize("std::vector<int> &amp; friends", Source::StackOverflow),
            "std::vector<int> & friends"
        );
    }

    #[test]
    fn entities_in_unencoded_sources_are_left_alone() {
        assert_eq!(canonicalize("R&amp;D error", Source::Manual), "R&amp;D error");
    }

    #[test]
    fn stackoverflow_titles_yield_error_fragments() {
        let rec = record(
            Source::StackOverflow,
            "Windows Update error 0x80070005 after reboot",
            json!({"score": 12, "view_count": 3400, "answer_count": 2}),
        );
        let candidate = normalize(&rec).expect("normalize");
        assert_eq!(candidate.raw_text, "0x80070005");
        assert_eq!(
            candidate.title.as_deref(),
            Some("Windows Update error 0x80070005 after reboot")
        );
        assert_eq!(candidate.source_signals["vote_count"], 12.0);
        assert_eq!(candidate.source_signals["view_count"], 3400.0);
        assert_eq!(candidate.confidence_score, 0.0);
    }

    #[test]
    fn short_titles_are_used_whole() {
        let rec = record(Source::StackOverflow, "npm install hangs forever", json!({}));
        let candidate = normalize(&rec).expect("normalize");
        assert_eq!(candidate.raw_text, "npm install hangs forever");
        assert!(candidate.title.is_none());
        assert!(candidate.source_signals.is_empty());
    }

    #[test]
    fn missing_signals_stay_absent() {
        let rec = record(
            Source::Reddit,
            "Blue screen crash with DRIVER_IRQL_NOT_LESS_OR_EQUAL",
            json!({"ups": 40, "num_comments": null}),
        );
        let candidate = normalize(&rec).expect("normalize");
        assert_eq!(candidate.source_signals.len(), 1);
        assert_eq!(candidate.source_signals["vote_count"], 40.0);
        assert!(!candidate.source_signals.contains_key("comment_count"));
    }

    #[test]
    fn reddit_posts_without_error_keywords_are_malformed() {
        let rec = record(Source::Reddit, "Which laptop should I buy?", json!({"ups": 500}));
        let err = normalize(&rec).unwrap_err();
        assert!(matches!(err, PressError::MalformedRecord { .. }));
    }

    #[test]
    fn empty_text_is_malformed() {
        let rec = record(Source::StackOverflow, "   &nbsp;  ", json!({}));
        assert!(matches!(
            normalize(&rec),
            Err(PressError::MalformedRecord { .. })
        ));
    }
}
