pub mod persister;
pub mod run_log;

use crate::models::{ArticleRecord, RunReport, RunStatus, ScrapingRun, Source};
use crate::scraper::cleaner::normalise_topic;
use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDateTime, Utc};
use duckdb::{Connection, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

pub use self::persister::{Persister, SaveSummary};
pub use self::run_log::RunLogger;

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS sources_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS articles_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS topics_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS scraping_logs_id_seq START 1;

CREATE TABLE IF NOT EXISTS sources (
    id              BIGINT PRIMARY KEY DEFAULT nextval('sources_id_seq'),
    name            VARCHAR NOT NULL UNIQUE,
    base_url        VARCHAR NOT NULL,
    is_active       BOOLEAN NOT NULL DEFAULT TRUE,
    last_scraped_at TIMESTAMP,
    created_at      TIMESTAMP NOT NULL,
    updated_at      TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS articles (
    id              BIGINT PRIMARY KEY DEFAULT nextval('articles_id_seq'),
    url             VARCHAR NOT NULL UNIQUE CHECK (url <> ''),
    title           VARCHAR NOT NULL,
    content         VARCHAR NOT NULL,
    source          VARCHAR NOT NULL,
    published_at    TIMESTAMP NOT NULL,
    author          VARCHAR,
    category        VARCHAR,
    word_count      BIGINT,
    reading_time    BIGINT,
    -- Filled in by the downstream sentiment consumer
    sentiment_score DOUBLE,
    sentiment_label VARCHAR,
    created_at      TIMESTAMP NOT NULL,
    updated_at      TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS topics (
    id          BIGINT PRIMARY KEY DEFAULT nextval('topics_id_seq'),
    name        VARCHAR NOT NULL UNIQUE,
    created_at  TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS article_topics (
    article_id  BIGINT NOT NULL,
    topic_id    BIGINT NOT NULL,
    PRIMARY KEY (article_id, topic_id)
);

CREATE TABLE IF NOT EXISTS scraping_logs (
    id                  BIGINT PRIMARY KEY DEFAULT nextval('scraping_logs_id_seq'),
    source_id           BIGINT NOT NULL,
    status              VARCHAR NOT NULL,
    articles_found      BIGINT NOT NULL DEFAULT 0,
    articles_scraped    BIGINT NOT NULL DEFAULT 0,
    error_message       VARCHAR,
    started_at          TIMESTAMP NOT NULL,
    completed_at        TIMESTAMP,
    created_at          TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     BIGINT PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_articles_published ON articles (published_at);
CREATE INDEX IF NOT EXISTS idx_articles_source    ON articles (source);
CREATE INDEX IF NOT EXISTS idx_logs_started       ON scraping_logs (started_at);
"#;

// ── Repository ────────────────────────────────────────────────────────────────

/// Owns the DuckDB connection. Every query the engine runs lives in this module.
pub struct Repository {
    conn: Mutex<Connection>,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Mutex::new(Connection::open_in_memory()?) })
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("DuckDB connection mutex poisoned"))
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        let conn = self.lock()?;
        conn.execute_batch(DDL).context("DDL failed")?;
        conn.execute_batch(INDEXES).context("Index creation failed")?;
        conn.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (1, ?) ON CONFLICT DO NOTHING",
            params![now()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Articles & topics ─────────────────────────────────────────────────────

    pub fn article_exists(&self, url: &str) -> Result<bool> {
        Ok(article_id(&*self.lock()?, url)?.is_some())
    }

    /// Names are case-normalised, so "Banking" and "banking" are one topic.
    pub fn get_or_create_topic(&self, name: &str) -> Result<i64> {
        let name = normalise_topic(name).ok_or_else(|| anyhow!("blank topic name"))?;
        upsert_topic(&*self.lock()?, &name)
    }

    pub fn article_count(&self) -> Result<i64> {
        count(&*self.lock()?, "SELECT COUNT(*) FROM articles")
    }

    pub fn topic_count(&self) -> Result<i64> {
        count(&*self.lock()?, "SELECT COUNT(*) FROM topics")
    }

    // ── Sources ───────────────────────────────────────────────────────────────

    pub fn get_or_create_source(&self, name: &str, base_url: &str) -> Result<i64> {
        upsert_source(&*self.lock()?, name, base_url)
    }

    /// Stamp `last_scraped_at`, creating the row on a source's first run.
    pub fn touch_source(&self, name: &str, base_url: &str, at: NaiveDateTime) -> Result<()> {
        self.lock()?
            .execute(
                r#"INSERT INTO sources (name, base_url, last_scraped_at, created_at, updated_at)
                   VALUES (?, ?, ?, ?, ?)
                   ON CONFLICT (name) DO UPDATE SET
                       last_scraped_at = excluded.last_scraped_at,
                       updated_at      = excluded.updated_at"#,
                params![name, base_url, at, at, at],
            )
            .with_context(|| format!("touch source {}", name))?;
        Ok(())
    }

    /// Unknown sources are active.
    pub fn source_is_active(&self, name: &str) -> Result<bool> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT is_active FROM sources WHERE name = ?")?;
        let mut rows = stmt.query(params![name])?;
        match rows.next()? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(true),
        }
    }

    pub fn set_source_active(&self, name: &str, base_url: &str, active: bool) -> Result<()> {
        let ts = now();
        self.lock()?
            .execute(
                r#"INSERT INTO sources (name, base_url, is_active, created_at, updated_at)
                   VALUES (?, ?, ?, ?, ?)
                   ON CONFLICT (name) DO UPDATE SET
                       is_active  = excluded.is_active,
                       updated_at = excluded.updated_at"#,
                params![name, base_url, active, ts, ts],
            )
            .with_context(|| format!("set active={} on {}", active, name))?;
        Ok(())
    }

    pub fn list_sources(&self) -> Result<Vec<Source>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, base_url, is_active, last_scraped_at FROM sources ORDER BY name",
        )?;
        let sources = stmt
            .query_map([], |r| {
                Ok(Source {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    base_url: r.get(2)?,
                    is_active: r.get(3)?,
                    last_scraped_at: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sources)
    }

    // ── Scraping log ──────────────────────────────────────────────────────────

    pub fn insert_scraping_log(
        &self,
        source_id: i64,
        report: &RunReport,
        completed_at: NaiveDateTime,
    ) -> Result<i64> {
        let conn = self.lock()?;
        let id = conn
            .query_row(
                r#"INSERT INTO scraping_logs
                       (source_id, status, articles_found, articles_scraped,
                        error_message, started_at, completed_at, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                   RETURNING id"#,
                params![
                    source_id,
                    report.status.as_str(),
                    report.articles_found as i64,
                    report.articles_scraped as i64,
                    report.error_message,
                    report.started_at,
                    completed_at,
                    now(),
                ],
                |r| r.get(0),
            )
            .with_context(|| format!("insert scraping log for {}", report.source_name))?;
        Ok(id)
    }

    pub fn run_count(&self) -> Result<i64> {
        count(&*self.lock()?, "SELECT COUNT(*) FROM scraping_logs")
    }

    /// Most recent runs first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<ScrapingRun>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"SELECT l.id, s.name, l.status, l.articles_found, l.articles_scraped,
                      l.error_message, l.started_at, l.completed_at
               FROM scraping_logs l JOIN sources s ON s.id = l.source_id
               ORDER BY l.started_at DESC, l.id DESC
               LIMIT ?"#,
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |r| {
                let status: String = r.get(2)?;
                Ok((
                    status,
                    ScrapingRun {
                        id: r.get(0)?,
                        source_name: r.get(1)?,
                        status: RunStatus::Error,
                        articles_found: r.get(3)?,
                        articles_scraped: r.get(4)?,
                        error_message: r.get(5)?,
                        started_at: r.get(6)?,
                        completed_at: r.get(7)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(status, mut run)| -> Result<ScrapingRun> {
                run.status = RunStatus::parse(&status)
                    .ok_or_else(|| anyhow!("unknown run status {:?} on log {}", status, run.id))?;
                Ok(run)
            })
            .collect()
    }
}

// ── Statement helpers (shared with the persister's transaction) ──────────────

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn count(conn: &Connection, sql: &str) -> Result<i64> {
    Ok(conn.query_row(sql, [], |r| r.get(0))?)
}

pub(crate) fn article_id(conn: &Connection, url: &str) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM articles WHERE url = ?")?;
    let mut rows = stmt.query(params![url])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

pub(crate) fn insert_article(conn: &Connection, a: &ArticleRecord) -> Result<i64> {
    let ts = now();
    let id = conn
        .query_row(
            r#"INSERT INTO articles
                   (url, title, content, source, published_at, author, category,
                    word_count, reading_time, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               RETURNING id"#,
            params![
                a.url, a.title, a.content, a.source, a.published_at,
                a.author, a.category,
                a.word_count, a.reading_time,
                ts, ts,
            ],
            |r| r.get(0),
        )
        .with_context(|| format!("insert article {}", a.url))?;
    Ok(id)
}

/// Atomic get-or-create against the UNIQUE(name) constraint.
pub(crate) fn upsert_topic(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO topics (name, created_at) VALUES (?, ?) ON CONFLICT (name) DO NOTHING",
        params![name, now()],
    )
    .with_context(|| format!("upsert topic {}", name))?;
    let id = conn.query_row("SELECT id FROM topics WHERE name = ?", params![name], |r| r.get(0))?;
    Ok(id)
}

pub(crate) fn link_topic(conn: &Connection, article_id: i64, topic_id: i64) -> Result<()> {
    conn.execute(
        r#"INSERT INTO article_topics (article_id, topic_id) VALUES (?, ?)
           ON CONFLICT DO NOTHING"#,
        params![article_id, topic_id],
    )
    .with_context(|| format!("link article {} to topic {}", article_id, topic_id))?;
    Ok(())
}

/// Atomic get-or-create against the UNIQUE(name) constraint. `base_url` is
/// only used when the row is created.
pub(crate) fn upsert_source(conn: &Connection, name: &str, base_url: &str) -> Result<i64> {
    let ts = now();
    conn.execute(
        r#"INSERT INTO sources (name, base_url, created_at, updated_at)
           VALUES (?, ?, ?, ?)
           ON CONFLICT (name) DO NOTHING"#,
        params![name, base_url, ts, ts],
    )
    .with_context(|| format!("upsert source {}", name))?;
    let id = conn.query_row("SELECT id FROM sources WHERE name = ?", params![name], |r| r.get(0))?;
    Ok(id)
}
