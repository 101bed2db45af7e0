pub mod cleaner;
pub mod http_client;
pub mod nairametrics;
pub mod parsers;

use crate::models::ArticleRecord;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use self::nairametrics::NairametricsScraper;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("invalid selector `{selector}`: {reason}")]
    Selector { selector: String, reason: String },

    #[error("could not open fetch session for {source_name}: {reason}")]
    Session { source_name: String, reason: String },

    #[error("{url}: missing {field}")]
    MissingField { url: String, field: &'static str },
}

// ── Fetch port ────────────────────────────────────────────────────────────────

/// Page fetch that never fails past its boundary: any failure is logged and
/// reported as `None`.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Option<String>;
}

/// Opens a fetch session scoped to one source's run.
pub trait SessionFactory: Send + Sync {
    fn open(&self, adapter: &dyn SourceAdapter) -> Result<Arc<dyn PageFetcher>>;

    /// How many article pages a category may have in flight at once.
    fn parallelism(&self) -> usize {
        1
    }
}

// ── Source trait ──────────────────────────────────────────────────────────────

/// Site-specific extraction. New sources implement this and are added to
/// [`registry`]; nothing else changes.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;
    fn base_url(&self) -> &str;
    fn categories(&self) -> &[String];

    /// Candidate article URLs for one category index page.
    async fn list_category_urls(
        &self,
        fetcher: &dyn PageFetcher,
        category: &str,
    ) -> Result<Vec<String>>;

    /// `Ok(None)` when the page is unreachable or lacks a title.
    async fn parse_article(
        &self,
        fetcher: &dyn PageFetcher,
        url: &str,
    ) -> Result<Option<ArticleRecord>>;
}

/// Every source the engine ingests, in run order.
pub fn registry() -> Vec<Arc<dyn SourceAdapter>> {
    vec![
        Arc::new(NairametricsScraper::new()),
        // Add more sources here
    ]
}
