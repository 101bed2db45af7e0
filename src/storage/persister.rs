//! Deduplicated article persistence.
//!
//! One call is one transaction. DuckDB aborts a transaction on the first failed
//! statement, so when a record fails the transaction is rolled back, reopened,
//! and the records accepted so far are written again before moving on. The
//! batch is still committed exactly once.

use crate::models::ArticleRecord;
use crate::scraper::cleaner::normalise_topic;
use crate::storage::{Repository, article_id, insert_article, link_topic, upsert_topic};
use anyhow::{Context, Result};
use duckdb::Connection;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SaveSummary {
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Persister {
    repo: Arc<Repository>,
}

impl Persister {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    pub fn save_articles(&self, records: &[ArticleRecord]) -> Result<SaveSummary> {
        let mut summary = SaveSummary::default();
        if records.is_empty() {
            return Ok(summary);
        }

        let mut conn = self.repo.lock()?;
        let mut tx = conn.transaction().context("begin article batch")?;
        let mut accepted: Vec<&ArticleRecord> = Vec::new();

        for record in records {
            match save_one(&tx, record) {
                Ok(true) => {
                    accepted.push(record);
                    summary.inserted += 1;
                }
                Ok(false) => {
                    debug!(url = %record.url, "Already stored, skipping");
                    summary.duplicates += 1;
                }
                Err(e) => {
                    warn!(url = %record.url, error = %format!("{:#}", e), "Failed to save article");
                    summary.failed += 1;

                    tx.rollback().context("rollback article batch")?;
                    tx = conn.transaction().context("reopen article batch")?;
                    for kept in &accepted {
                        save_one(&tx, kept)
                            .with_context(|| format!("replay article {}", kept.url))?;
                    }
                }
            }
        }

        tx.commit().context("commit article batch")?;

        info!(
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            failed = summary.failed,
            "Saved article batch"
        );
        Ok(summary)
    }
}

/// `Ok(false)` when the URL is already stored.
fn save_one(conn: &Connection, record: &ArticleRecord) -> Result<bool> {
    if article_id(conn, &record.url)?.is_some() {
        return Ok(false);
    }

    let id = insert_article(conn, record)?;
    for name in record.topics.iter().filter_map(|t| normalise_topic(t)) {
        let topic_id = upsert_topic(conn, &name)?;
        link_topic(conn, id, topic_id)?;
    }
    Ok(true)
}
