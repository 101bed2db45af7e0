use chrono::{DateTime, NaiveDateTime};
use std::collections::BTreeSet;

// ── Derived metrics ───────────────────────────────────────────────────────────

const WORDS_PER_MINUTE: i64 = 200;

/// Whitespace token count.
pub fn word_count(content: &str) -> i64 {
    content.split_whitespace().count() as i64
}

/// Minutes to read, never below one.
pub fn reading_time(word_count: i64) -> i64 {
    (word_count / WORDS_PER_MINUTE).max(1)
}

// ── Timestamps ────────────────────────────────────────────────────────────────

/// Parse a page timestamp into naive UTC.
/// "2024-05-02T10:15:00+01:00" → 2024-05-02 09:15:00 | "2024-05-02T10:15:00Z" | "2024-05-02 10:15:00"
pub fn parse_published_at(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    None
}

// ── Topics ────────────────────────────────────────────────────────────────────

/// Topic → keywords matched against lower-cased article text.
pub const FINANCIAL_TOPICS: &[(&str, &[&str])] = &[
    ("banking", &["bank", "banking", "cbn", "central bank"]),
    ("economy", &["economy", "economic", "gdp", "inflation"]),
    ("markets", &["market", "stock", "nse", "trading"]),
    ("technology", &["tech", "digital", "fintech", "blockchain"]),
    ("business", &["business", "company", "corporate", "enterprise"]),
];

pub fn normalise_topic(s: &str) -> Option<String> {
    let s = s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    if s.is_empty() { None } else { Some(s) }
}

/// Declared category plus every topic whose keywords appear in the content.
pub fn extract_topics(content: &str, category: Option<&str>) -> Vec<String> {
    let mut topics = BTreeSet::new();

    if let Some(cat) = category.and_then(normalise_topic) {
        topics.insert(cat);
    }

    let lower = content.to_lowercase();
    for (topic, keywords) in FINANCIAL_TOPICS {
        if keywords.iter().any(|k| lower.contains(k)) {
            topics.insert((*topic).to_string());
        }
    }

    topics.into_iter().collect()
}

/// `Some(trimmed)` unless blank.
pub fn non_empty(s: Option<String>) -> Option<String> {
    s.and_then(|s| {
        let s = s.trim();
        if s.is_empty() { None } else { Some(s.to_string()) }
    })
}
