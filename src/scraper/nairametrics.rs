//! Nairametrics (https://nairametrics.com), a Nigerian financial news site.
//!
//! Category index pages live at `/category/<name>/` and list posts as
//! `div.post-listing article.post`; each post links to its article page through
//! the `h2.entry-title a` headline.

use crate::models::ArticleRecord;
use crate::scraper::cleaner::{extract_topics, non_empty, parse_published_at, reading_time, word_count};
use crate::scraper::parsers::{first_attr, first_text, joined_text, listing_links};
use crate::scraper::{PageFetcher, ScrapeError, SourceAdapter};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use scraper::Html;
use tracing::{debug, info, warn};
use url::Url;

const SOURCE_NAME: &str = "Nairametrics";
const BASE_URL: &str = "https://nairametrics.com";
const CATEGORIES: [&str; 5] = ["banking", "economy", "markets", "technology", "business"];

const LISTING_ITEM: &str = "div.post-listing article.post";
const LISTING_LINK: &str = "h2.entry-title a";
const TITLE: [&str; 3] = ["h1.entry-title", "h2.entry-title a", "h1"];
const CONTENT: &str = "div.entry-content p";
const DATE: &str = "time.entry-date";
const DATE_META: &str = "meta[property='article:published_time']";
const AUTHOR: [&str; 2] = ["span.author-name", "a[rel='author']"];
const CATEGORY: [&str; 1] = ["span.category-name"];

pub struct NairametricsScraper {
    base_url: String,
    categories: Vec<String>,
}

impl NairametricsScraper {
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL)
    }

    /// Point the adapter at a different host (mirrors, fixtures).
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            categories: CATEGORIES.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// e.g. banking → https://nairametrics.com/category/banking/
    fn category_url(&self, category: &str) -> String {
        format!("{}/category/{}/", self.base_url, category)
    }
}

impl Default for NairametricsScraper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for NairametricsScraper {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn categories(&self) -> &[String] {
        &self.categories
    }

    async fn list_category_urls(
        &self,
        fetcher: &dyn PageFetcher,
        category: &str,
    ) -> Result<Vec<String>> {
        let url = self.category_url(category);
        let base = match Url::parse(&url) {
            Ok(base) => base,
            Err(e) => {
                warn!(source = SOURCE_NAME, %url, error = %e, "Bad category url");
                return Ok(vec![]);
            }
        };

        let Some(html) = fetcher.fetch(&url).await else {
            warn!(source = SOURCE_NAME, %category, "Category index unavailable");
            return Ok(vec![]);
        };

        match listing_links(&html, &base, LISTING_ITEM, LISTING_LINK) {
            Ok(urls) => {
                info!(source = SOURCE_NAME, %category, count = urls.len(), "Listed article URLs");
                Ok(urls)
            }
            Err(e) => {
                warn!(source = SOURCE_NAME, %category, error = %e, "Could not parse category index");
                Ok(vec![])
            }
        }
    }

    async fn parse_article(
        &self,
        fetcher: &dyn PageFetcher,
        url: &str,
    ) -> Result<Option<ArticleRecord>> {
        let Some(html) = fetcher.fetch(url).await else {
            return Ok(None);
        };

        match extract_article(&html, url, Utc::now().naive_utc()) {
            Ok(record) => Ok(Some(record)),
            Err(ScrapeError::MissingField { field, .. }) => {
                debug!(%url, field, "Skipping article without mandatory field");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Build a record from an article page. `now` stands in for a missing or
/// unparsable publication time.
fn extract_article(html: &str, url: &str, now: NaiveDateTime) -> Result<ArticleRecord, ScrapeError> {
    let doc = Html::parse_document(html);

    let title = first_text(&doc, &TITLE)?.ok_or_else(|| ScrapeError::MissingField {
        url: url.to_string(),
        field: "title",
    })?;

    let content = joined_text(&doc, CONTENT)?;

    let raw_date = match first_attr(&doc, DATE, "datetime")? {
        Some(d) => Some(d),
        None => first_attr(&doc, DATE_META, "content")?,
    };
    let published_at = match raw_date.as_deref().map(|d| (d, parse_published_at(d))) {
        Some((_, Some(ts))) => ts,
        Some((raw, None)) => {
            warn!(%url, raw, "Could not parse publication date");
            now
        }
        None => now,
    };

    let author = non_empty(first_text(&doc, &AUTHOR)?);
    let category = non_empty(first_text(&doc, &CATEGORY)?);

    let words = word_count(&content);
    let topics = extract_topics(&content, category.as_deref());

    Ok(ArticleRecord {
        url: url.to_string(),
        title,
        content,
        source: SOURCE_NAME.to_string(),
        published_at,
        author,
        category,
        word_count: words,
        reading_time: reading_time(words),
        topics,
    })
}
