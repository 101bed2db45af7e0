use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Parsed article ────────────────────────────────────────────────────────────

/// One article as extracted from a source page, before persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArticleRecord {
    pub url: String,
    pub title: String,
    pub content: String,
    pub source: String,
    pub published_at: NaiveDateTime,
    pub author: Option<String>,
    pub category: Option<String>,
    pub word_count: i64,
    pub reading_time: i64, // minutes
    pub topics: Vec<String>,
}

// ── Stored rows ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub base_url: String,
    pub is_active: bool,
    pub last_scraped_at: Option<NaiveDateTime>,
}

/// A `scraping_logs` row joined with its source name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapingRun {
    pub id: i64,
    pub source_name: String,
    pub status: RunStatus,
    pub articles_found: i64,
    pub articles_scraped: i64,
    pub error_message: Option<String>,
    pub started_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

// ── Run status ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Partial,
    Error,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "success" => Some(RunStatus::Success),
            "partial" => Some(RunStatus::Partial),
            "error" => Some(RunStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// What the run logger writes for one source attempt.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub source_name: String,
    pub base_url: String,
    pub status: RunStatus,
    pub articles_found: usize,
    pub articles_scraped: usize,
    pub error_message: Option<String>,
    pub started_at: NaiveDateTime,
}
