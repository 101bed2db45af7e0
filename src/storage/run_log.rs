use crate::models::RunReport;
use crate::storage::Repository;
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};

/// Writes one `scraping_logs` row per source attempt. Never fails outward.
#[derive(Clone)]
pub struct RunLogger {
    repo: Arc<Repository>,
}

impl RunLogger {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    pub fn log_run(&self, report: &RunReport) {
        match self.write(report) {
            Ok(id) => info!(
                source = %report.source_name,
                status = %report.status,
                found = report.articles_found,
                scraped = report.articles_scraped,
                log_id = id,
                "Logged scraping run"
            ),
            Err(e) => error!(
                source = %report.source_name,
                status = %report.status,
                error = %format!("{:#}", e),
                "Failed to log scraping run"
            ),
        }
    }

    fn write(&self, report: &RunReport) -> Result<i64> {
        let source_id = self.repo.get_or_create_source(&report.source_name, &report.base_url)?;
        self.repo.insert_scraping_log(source_id, report, Utc::now().naive_utc())
    }
}
