use crate::config::ScraperConfig;
use crate::scraper::{PageFetcher, ScrapeError, SessionFactory, SourceAdapter};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, warn};

// ── Limiter ───────────────────────────────────────────────────────────────────

/// Process-wide bound on in-flight fetches. Callers past the bound wait for a slot.
#[derive(Debug, Clone)]
pub struct FetchLimiter {
    slots: Arc<Semaphore>,
}

impl FetchLimiter {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// `None` only if the semaphore was closed, which this crate never does.
    pub async fn acquire(&self) -> Option<SemaphorePermit<'_>> {
        self.slots.acquire().await.ok()
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

/// One fetch session: a reqwest client with the identification headers,
/// throttled by the shared limiter.
pub struct HttpClient {
    inner: reqwest::Client,
    limiter: FetchLimiter,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig, limiter: FetchLimiter) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user-agent header")?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_str(&config.accept).context("Invalid accept header")?,
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language)
                .context("Invalid accept-language header")?,
        );

        let inner = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { inner, limiter })
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch(&self, url: &str) -> Option<String> {
        let Some(_permit) = self.limiter.acquire().await else {
            warn!(%url, "Fetch limiter closed");
            return None;
        };

        debug!(%url, "GET");
        let resp = match self.inner.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(%url, error = %e, "Request failed");
                return None;
            }
        };

        let status = resp.status();
        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "Non-success status");
            return None;
        }

        match resp.text().await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!(%url, error = %e, "Failed to read response body");
                None
            }
        }
    }
}

// ── Sessions ──────────────────────────────────────────────────────────────────

/// Opens one `HttpClient` per source, all sharing a single limiter.
pub struct HttpSessions {
    config: ScraperConfig,
    limiter: FetchLimiter,
}

impl HttpSessions {
    pub fn new(config: ScraperConfig) -> Self {
        let limiter = FetchLimiter::new(config.max_concurrent_requests);
        Self { config, limiter }
    }
}

impl SessionFactory for HttpSessions {
    fn open(&self, adapter: &dyn SourceAdapter) -> Result<Arc<dyn PageFetcher>> {
        let client = HttpClient::new(&self.config, self.limiter.clone()).map_err(|e| {
            ScrapeError::Session {
                source_name: adapter.name().to_string(),
                reason: format!("{:#}", e),
            }
        })?;
        Ok(Arc::new(client))
    }

    fn parallelism(&self) -> usize {
        self.config.max_concurrent_requests.max(1)
    }
}
