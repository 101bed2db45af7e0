//! Orchestrator: ties sources → category pipelines → storage together.
//!
//! ## One pass (`run_once`)
//!   For every registered, active source, in order:
//!   1. Open a fetch session for the source.
//!   2. Scrape each category; a failing category is recorded and the rest still run.
//!   3. Persist everything collected, stamp the source's `last_scraped_at`.
//!   4. Write exactly one `scraping_logs` row: `success`, or `partial` if any category failed.
//!
//!   Anything escaping steps 1–2 or the save, including a panic inside the
//!   adapter, is a source-level failure: it is logged as an `error` run with zero
//!   counts and the pass moves on to the next source. A failed stamp is only logged.

pub mod category;

use crate::models::{ArticleRecord, RunReport, RunStatus};
use crate::scraper::{SessionFactory, SourceAdapter};
use crate::storage::{Persister, Repository, RunLogger, SaveSummary};
use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

use self::category::CategoryPipeline;

pub struct Orchestrator {
    sources: Vec<Arc<dyn SourceAdapter>>,
    sessions: Arc<dyn SessionFactory>,
    repo: Arc<Repository>,
    persister: Persister,
    run_logger: RunLogger,
}

impl Orchestrator {
    pub fn new(
        sources: Vec<Arc<dyn SourceAdapter>>,
        sessions: Arc<dyn SessionFactory>,
        repo: Arc<Repository>,
    ) -> Self {
        Self {
            sources,
            sessions,
            persister: Persister::new(Arc::clone(&repo)),
            run_logger: RunLogger::new(Arc::clone(&repo)),
            repo,
        }
    }

    /// One full pass over every source. Failures end up in the run log, never here.
    pub async fn run_once(&self) -> RunSummary {
        let started_at = Utc::now().naive_utc();
        let mut outcomes = Vec::with_capacity(self.sources.len());

        for adapter in &self.sources {
            let adapter = adapter.as_ref();

            match self.repo.source_is_active(adapter.name()) {
                Ok(false) => {
                    info!(source = adapter.name(), "Source inactive, skipping");
                    continue;
                }
                Ok(true) => {}
                Err(e) => warn!(source = adapter.name(), error = %e, "Could not read source flag, running anyway"),
            }

            let source_started = Utc::now().naive_utc();
            let attempt = AssertUnwindSafe(self.scrape_source(adapter, source_started))
                .catch_unwind()
                .await;
            let message = match attempt {
                Ok(Ok(outcome)) => {
                    outcomes.push(outcome);
                    continue;
                }
                Ok(Err(e)) => format!("{:#}", e),
                Err(payload) => format!("adapter panicked: {}", panic_message(payload.as_ref())),
            };

            error!(source = adapter.name(), error = %message, "Source run failed");
            let outcome = SourceOutcome {
                source: adapter.name().to_string(),
                status: RunStatus::Error,
                articles_found: 0,
                articles_scraped: 0,
                error_message: Some(message),
            };
            self.run_logger.log_run(&outcome.report(adapter.base_url(), source_started));
            outcomes.push(outcome);
        }

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now().naive_utc(),
            sources: outcomes,
        };
        info!(
            sources = summary.sources.len(),
            scraped = summary.total_scraped(),
            "=== Pass complete ==="
        );
        summary
    }

    async fn scrape_source(
        &self,
        adapter: &dyn SourceAdapter,
        started_at: NaiveDateTime,
    ) -> Result<SourceOutcome> {
        let source = adapter.name();
        info!(%source, "=== Scraping source ===");

        let fetcher = self.sessions.open(adapter)?;
        let pipeline = CategoryPipeline::new(adapter, fetcher.as_ref(), self.sessions.parallelism());

        let mut found = 0usize;
        let mut scraped = 0usize;
        let mut error_message: Option<String> = None;
        let mut collected: Vec<ArticleRecord> = Vec::new();

        for category in adapter.categories() {
            match pipeline.scrape_category(category).await {
                Ok(harvest) => {
                    found += harvest.found;
                    scraped += harvest.articles.len();
                    collected.extend(harvest.articles);
                }
                Err(e) => {
                    let message = format!("{:#}", e);
                    warn!(%source, %category, error = %message, "Category failed");
                    error_message = Some(message);
                }
            }
        }

        let saved: SaveSummary = self
            .persister
            .save_articles(&collected)
            .with_context(|| format!("saving {} articles", source))?;
        info!(
            %source,
            inserted = saved.inserted,
            duplicates = saved.duplicates,
            failed = saved.failed,
            "Stored source articles"
        );

        // articles are already committed here
        if let Err(e) = self.repo.touch_source(source, adapter.base_url(), Utc::now().naive_utc()) {
            error!(%source, error = %format!("{:#}", e), "Could not update last_scraped_at");
        }

        let outcome = SourceOutcome {
            source: source.to_string(),
            status: if error_message.is_none() { RunStatus::Success } else { RunStatus::Partial },
            articles_found: found,
            articles_scraped: scraped,
            error_message,
        };
        self.run_logger.log_run(&outcome.report(adapter.base_url(), started_at));
        Ok(outcome)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceOutcome {
    pub source: String,
    pub status: RunStatus,
    pub articles_found: usize,
    pub articles_scraped: usize,
    pub error_message: Option<String>,
}

impl SourceOutcome {
    fn report(&self, base_url: &str, started_at: NaiveDateTime) -> RunReport {
        RunReport {
            source_name: self.source.clone(),
            base_url: base_url.to_string(),
            status: self.status,
            articles_found: self.articles_found,
            articles_scraped: self.articles_scraped,
            error_message: self.error_message.clone(),
            started_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub sources: Vec<SourceOutcome>,
}

impl RunSummary {
    pub fn total_scraped(&self) -> usize {
        self.sources.iter().map(|s| s.articles_scraped).sum()
    }

    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.status == RunStatus::Error).count()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::scraper::{PageFetcher, ScrapeError};
    use crate::storage::tests::repo;
    use anyhow::bail;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::{HashMap, HashSet};

    // ── Fakes ─────────────────────────────────────────────────────────────────

    pub(crate) struct NullFetcher;

    #[async_trait]
    impl PageFetcher for NullFetcher {
        async fn fetch(&self, _url: &str) -> Option<String> {
            None
        }
    }

    /// Adapter driven entirely by in-memory tables; ignores the fetcher.
    pub(crate) struct FakeAdapter {
        name: String,
        categories: Vec<String>,
        urls: HashMap<String, Vec<String>>,
        failing_listings: HashSet<String>,
        panicking_listings: HashSet<String>,
        failing_articles: HashSet<String>,
        empty_articles: HashSet<String>,
    }

    impl FakeAdapter {
        pub(crate) fn new(name: &str, categories: &[&str]) -> Self {
            Self {
                name: name.to_string(),
                categories: categories.iter().map(|c| c.to_string()).collect(),
                urls: HashMap::new(),
                failing_listings: HashSet::new(),
                panicking_listings: HashSet::new(),
                failing_articles: HashSet::new(),
                empty_articles: HashSet::new(),
            }
        }

        pub(crate) fn with_urls(mut self, category: &str, urls: &[&str]) -> Self {
            self.urls
                .insert(category.to_string(), urls.iter().map(|u| u.to_string()).collect());
            self
        }

        pub(crate) fn failing_listing(mut self, category: &str) -> Self {
            self.failing_listings.insert(category.to_string());
            self
        }

        pub(crate) fn panicking_listing(mut self, category: &str) -> Self {
            self.panicking_listings.insert(category.to_string());
            self
        }

        pub(crate) fn failing_article(mut self, url: &str) -> Self {
            self.failing_articles.insert(url.to_string());
            self
        }

        pub(crate) fn empty_article(mut self, url: &str) -> Self {
            self.empty_articles.insert(url.to_string());
            self
        }
    }

    #[async_trait]
    impl SourceAdapter for FakeAdapter {
        fn name(&self) -> &str {
            &self.name
        }

        fn base_url(&self) -> &str {
            "https://fake.test"
        }

        fn categories(&self) -> &[String] {
            &self.categories
        }

        async fn list_category_urls(
            &self,
            _fetcher: &dyn PageFetcher,
            category: &str,
        ) -> Result<Vec<String>> {
            if self.panicking_listings.contains(category) {
                panic!("index for {} is not a listing", category);
            }
            if self.failing_listings.contains(category) {
                bail!("index for {} exploded", category);
            }
            Ok(self.urls.get(category).cloned().unwrap_or_default())
        }

        async fn parse_article(
            &self,
            _fetcher: &dyn PageFetcher,
            url: &str,
        ) -> Result<Option<ArticleRecord>> {
            if self.failing_articles.contains(url) {
                bail!("parser blew up on {}", url);
            }
            if self.empty_articles.contains(url) {
                return Ok(None);
            }
            Ok(Some(ArticleRecord {
                url: url.to_string(),
                title: format!("Headline {}", url),
                content: "Stock market rally".to_string(),
                source: self.name.clone(),
                published_at: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(12, 0, 0).unwrap(),
                author: None,
                category: None,
                word_count: 3,
                reading_time: 1,
                topics: vec!["markets".to_string()],
            }))
        }
    }

    /// Hands out `NullFetcher` sessions, refusing the named sources.
    pub(crate) struct FakeSessions {
        refuse: HashSet<String>,
    }

    impl FakeSessions {
        pub(crate) fn new() -> Self {
            Self { refuse: HashSet::new() }
        }

        pub(crate) fn refusing(mut self, source: &str) -> Self {
            self.refuse.insert(source.to_string());
            self
        }
    }

    impl SessionFactory for FakeSessions {
        fn open(&self, adapter: &dyn SourceAdapter) -> Result<Arc<dyn PageFetcher>> {
            if self.refuse.contains(adapter.name()) {
                return Err(ScrapeError::Session {
                    source_name: adapter.name().to_string(),
                    reason: "connection pool exhausted".to_string(),
                }
                .into());
            }
            Ok(Arc::new(NullFetcher))
        }

        fn parallelism(&self) -> usize {
            2
        }
    }

    fn orchestrator(sources: Vec<Arc<dyn SourceAdapter>>, sessions: FakeSessions) -> (Orchestrator, Arc<Repository>) {
        let repo = Arc::new(repo());
        (Orchestrator::new(sources, Arc::new(sessions), Arc::clone(&repo)), repo)
    }

    // ── Properties ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn failing_category_degrades_run_to_partial() {
        let adapter = FakeAdapter::new("Fake", &["one", "two", "three"])
            .with_urls("one", &["u1", "u2"])
            .failing_listing("two")
            .with_urls("three", &["u3", "u4"]);
        let (orch, repo) = orchestrator(vec![Arc::new(adapter)], FakeSessions::new());

        let summary = orch.run_once().await;

        let runs = repo.recent_runs(10).unwrap();
        assert_eq!(runs.len(), 1);
        let run = &runs[0];
        assert_eq!(run.status, RunStatus::Partial);
        assert_eq!(run.articles_found, 4);
        assert_eq!(run.articles_scraped, 4);
        assert!(run.error_message.as_deref().is_some_and(|m| m.contains("exploded")));

        assert_eq!(summary.total_scraped(), 4);
        assert_eq!(repo.article_count().unwrap(), 4);
    }

    #[tokio::test]
    async fn crashed_source_does_not_stop_the_next() {
        let a = FakeAdapter::new("A", &["x"]).with_urls("x", &["a1"]);
        let b = FakeAdapter::new("B", &["x", "y"])
            .with_urls("x", &["b1", "b2"])
            .with_urls("y", &["b3"]);
        let (orch, repo) = orchestrator(
            vec![Arc::new(a), Arc::new(b)],
            FakeSessions::new().refusing("A"),
        );

        let summary = orch.run_once().await;
        assert_eq!(summary.failed_sources(), 1);

        let runs = repo.recent_runs(10).unwrap();
        assert_eq!(runs.len(), 2);

        let a_run = runs.iter().find(|r| r.source_name == "A").unwrap();
        assert_eq!(a_run.status, RunStatus::Error);
        assert_eq!(a_run.articles_found, 0);
        assert_eq!(a_run.articles_scraped, 0);
        assert_eq!(
            a_run.error_message.as_deref(),
            Some("could not open fetch session for A: connection pool exhausted")
        );

        let b_run = runs.iter().find(|r| r.source_name == "B").unwrap();
        assert_eq!(b_run.status, RunStatus::Success);
        assert_eq!(b_run.articles_scraped, 3);
        assert_eq!(b_run.error_message, None);
        assert_eq!(repo.article_count().unwrap(), 3);
    }

    #[tokio::test]
    async fn every_attempt_logs_exactly_once_and_stamps_source() {
        let adapter = FakeAdapter::new("Fake", &["c"]).with_urls("c", &["u1", "bad"]).failing_article("bad");
        let (orch, repo) = orchestrator(vec![Arc::new(adapter)], FakeSessions::new());

        orch.run_once().await;
        orch.run_once().await;

        let runs = repo.recent_runs(10).unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r.status == RunStatus::Success));
        assert!(runs.iter().all(|r| r.articles_found == 2 && r.articles_scraped == 1));
        // second pass re-scraped u1 but stored nothing new
        assert_eq!(repo.article_count().unwrap(), 1);

        let sources = repo.list_sources().unwrap();
        assert_eq!(sources.len(), 1);
        assert!(sources[0].last_scraped_at.is_some());
    }

    #[tokio::test]
    async fn inactive_sources_are_skipped() {
        let adapter = FakeAdapter::new("Fake", &["c"]).with_urls("c", &["u1"]);
        let (orch, repo) = orchestrator(vec![Arc::new(adapter)], FakeSessions::new());
        repo.set_source_active("Fake", "https://fake.test", false).unwrap();

        let summary = orch.run_once().await;

        assert!(summary.sources.is_empty());
        assert_eq!(repo.run_count().unwrap(), 0);
        assert_eq!(repo.article_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn panicking_adapter_is_logged_and_next_source_runs() {
        let p = FakeAdapter::new("P", &["x"]).panicking_listing("x");
        let b = FakeAdapter::new("B", &["x"]).with_urls("x", &["b1", "b2"]);
        let (orch, repo) = orchestrator(vec![Arc::new(p), Arc::new(b)], FakeSessions::new());

        let summary = orch.run_once().await;
        assert_eq!(summary.sources.len(), 2);
        assert_eq!(summary.failed_sources(), 1);

        let runs = repo.recent_runs(10).unwrap();
        assert_eq!(runs.len(), 2);

        let p_run = runs.iter().find(|r| r.source_name == "P").unwrap();
        assert_eq!(p_run.status, RunStatus::Error);
        assert_eq!(p_run.articles_found, 0);
        assert_eq!(p_run.articles_scraped, 0);
        assert!(p_run.error_message.as_deref().is_some_and(|m| m.starts_with("adapter panicked")));

        let b_run = runs.iter().find(|r| r.source_name == "B").unwrap();
        assert_eq!(b_run.status, RunStatus::Success);
        assert_eq!(b_run.articles_scraped, 2);
        assert_eq!(repo.article_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn failed_stamp_keeps_the_real_run_counts() {
        let adapter = FakeAdapter::new("Fake", &["c"]).with_urls("c", &["u1", "u2"]);
        let (orch, repo) = orchestrator(vec![Arc::new(adapter)], FakeSessions::new());
        // Rebuild `sources` so any non-null last_scraped_at is rejected.
        repo.lock()
            .unwrap()
            .execute_batch(
                r#"DROP TABLE sources;
                   CREATE TABLE sources (
                       id              BIGINT PRIMARY KEY DEFAULT nextval('sources_id_seq'),
                       name            VARCHAR NOT NULL UNIQUE,
                       base_url        VARCHAR NOT NULL,
                       is_active       BOOLEAN NOT NULL DEFAULT TRUE,
                       last_scraped_at TIMESTAMP CHECK (last_scraped_at IS NULL),
                       created_at      TIMESTAMP NOT NULL,
                       updated_at      TIMESTAMP NOT NULL
                   );"#,
            )
            .unwrap();
        assert!(repo.touch_source("Other", "https://other.test", Utc::now().naive_utc()).is_err());

        let summary = orch.run_once().await;
        assert_eq!(summary.failed_sources(), 0);

        let runs = repo.recent_runs(10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Success);
        assert_eq!(runs[0].articles_found, 2);
        assert_eq!(runs[0].articles_scraped, 2);
        assert_eq!(runs[0].error_message, None);
        assert_eq!(repo.article_count().unwrap(), 2);
        assert_eq!(repo.list_sources().unwrap()[0].last_scraped_at, None);
    }
}
