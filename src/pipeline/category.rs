use crate::models::ArticleRecord;
use crate::scraper::{PageFetcher, SourceAdapter};
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

/// What one category produced.
#[derive(Debug, Default)]
pub struct CategoryHarvest {
    /// URLs the index page listed.
    pub found: usize,
    pub articles: Vec<ArticleRecord>,
}

/// Drives one adapter over one category with a single fetch session.
pub struct CategoryPipeline<'a> {
    adapter: &'a dyn SourceAdapter,
    fetcher: &'a dyn PageFetcher,
    parallelism: usize,
}

impl<'a> CategoryPipeline<'a> {
    pub fn new(adapter: &'a dyn SourceAdapter, fetcher: &'a dyn PageFetcher, parallelism: usize) -> Self {
        Self {
            adapter,
            fetcher,
            parallelism: parallelism.max(1),
        }
    }

    /// List the category, then parse each URL. A failing URL is logged and
    /// skipped; only a failing listing fails the category.
    pub async fn scrape_category(&self, category: &str) -> Result<CategoryHarvest> {
        let source = self.adapter.name();
        let urls = self
            .adapter
            .list_category_urls(self.fetcher, category)
            .await
            .with_context(|| format!("listing {} / {}", source, category))?;
        let found = urls.len();

        let articles: Vec<ArticleRecord> = stream::iter(urls)
            .map(|url| async move {
                match self.adapter.parse_article(self.fetcher, &url).await {
                    Ok(Some(article)) => Some(article),
                    Ok(None) => {
                        debug!(%source, %url, "No article extracted");
                        None
                    }
                    Err(e) => {
                        warn!(%source, %url, error = %format!("{:#}", e), "Article failed, skipping");
                        None
                    }
                }
            })
            .buffer_unordered(self.parallelism)
            .filter_map(|article| async move { article })
            .collect()
            .await;

        info!(%source, %category, found, scraped = articles.len(), "Category done");
        Ok(CategoryHarvest { found, articles })
    }
}
