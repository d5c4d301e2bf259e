//! HTTP fetcher implementation
//!
//! This module handles all network access for the harvester, including:
//! - Building the pooled HTTP client with the configured user agent
//! - The `DocumentSource` seam that hides the transport
//! - Retry with exponential backoff for transient failures
//! - Honoring `Retry-After` hints on HTTP 429
//! - Counting requests in flight

use crate::config::{PipelineConfig, SiteConfig};
use crate::FetchError;
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Raw transport response: status, body and any rate-limit hint
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub retry_after: Option<Duration>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport-level failure, before any status code is known
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Timeout,
    Connect(String),
    Other(String),
}

impl From<TransportError> for FetchError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Timeout => FetchError::Timeout,
            TransportError::Connect(_) | TransportError::Other(_) => FetchError::ConnectionFailed,
        }
    }
}

/// Opaque source of documents
///
/// Given a URL, returns raw bytes plus an HTTP status. The fetcher owns retry
/// and timeout policy; implementations only move bytes.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError>;
}

/// reqwest-backed document source
///
/// Owns the connection pool for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a source with a fresh client for the given site
    pub fn from_config(site: &SiteConfig, pipeline: &PipelineConfig) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_millis(pipeline.request_timeout_ms);
        Ok(Self::new(build_http_client(site, timeout)?))
    }
}

#[async_trait]
impl DocumentSource for HttpSource {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
        let response = self.client.get(url).send().await.map_err(classify_error)?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);

        let body = response.bytes().await.map_err(classify_error)?;

        Ok(RawResponse {
            status,
            body: body.to_vec(),
            retry_after,
        })
    }
}

fn classify_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else {
        TransportError::Other(error.to_string())
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use catalog_harvest::config::SiteConfig;
/// use catalog_harvest::crawler::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client(&SiteConfig::default(), Duration::from_secs(10)).unwrap();
/// ```
pub fn build_http_client(site: &SiteConfig, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(site.user_agent.clone())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Parses a `Retry-After` header (delta-seconds or HTTP-date)
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let when = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = when.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

/// Retry and timeout policy for one fetcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    pub base_delay: Duration,

    /// Upper bound on any single delay, including `Retry-After` hints
    pub max_delay: Duration,

    /// Per-attempt timeout
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.backoff_base_ms),
            max_delay: Duration::from_millis(config.backoff_max_ms),
            timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    /// Delay after failed attempt number `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// Counts requests in flight and remembers the high-water mark
#[derive(Debug, Default)]
pub struct FetchGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl FetchGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) -> GaugeGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard { gauge: self }
    }
}

struct GaugeGuard<'a> {
    gauge: &'a FetchGauge,
}

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.gauge.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A fetched, successfully-answered document
#[derive(Debug, Clone)]
pub struct Document {
    /// URL the document was requested from; relative links resolve against it
    pub url: Url,
    pub body: String,
}

impl Document {
    pub fn new(url: Url, body: impl Into<String>) -> Self {
        Self {
            url,
            body: body.into(),
        }
    }
}

/// Retrying fetcher over a document source
///
/// # Retry Logic
///
/// | Condition | Action |
/// |-----------|--------|
/// | 2xx | Return body |
/// | HTTP 429 | Retry after `Retry-After`, or backoff if absent |
/// | Other 4xx | Fail immediately with `ClientRejected` |
/// | HTTP 5xx | Retry with backoff |
/// | Timeout | Retry with backoff |
/// | Connection failure | Retry with backoff |
#[derive(Clone)]
pub struct Fetcher {
    source: Arc<dyn DocumentSource>,
    policy: RetryPolicy,
    gauge: Arc<FetchGauge>,
}

impl Fetcher {
    pub fn new(source: Arc<dyn DocumentSource>, policy: RetryPolicy) -> Self {
        Self {
            source,
            policy,
            gauge: Arc::new(FetchGauge::new()),
        }
    }

    /// Returns a fetcher over the same source with its own in-flight gauge
    pub fn with_separate_gauge(&self) -> Self {
        Self::new(self.source.clone(), self.policy)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn gauge(&self) -> Arc<FetchGauge> {
        self.gauge.clone()
    }

    /// Fetches a text document
    pub async fn fetch(&self, url: &Url) -> Result<Document, FetchError> {
        let response = self.request_with_retry(url.as_str()).await?;
        let body = String::from_utf8_lossy(&response.body).into_owned();
        Ok(Document::new(url.clone(), body))
    }

    /// Fetches raw bytes
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        Ok(self.request_with_retry(url).await?.body)
    }

    async fn request_with_retry(&self, url: &str) -> Result<RawResponse, FetchError> {
        let _in_flight = self.gauge.enter();
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = FetchError::ConnectionFailed;

        for attempt in 0..attempts {
            let mut hint = None;

            let error = match tokio::time::timeout(self.policy.timeout, self.source.get(url)).await {
                Err(_) => FetchError::Timeout,
                Ok(Err(transport)) => transport.into(),
                Ok(Ok(response)) if response.is_success() => {
                    tracing::trace!("GET {} -> {} (attempt {})", url, response.status, attempt + 1);
                    return Ok(response);
                }
                Ok(Ok(response)) if response.status >= 500 => FetchError::ServerError(response.status),
                Ok(Ok(response)) => {
                    hint = response.retry_after;
                    FetchError::ClientRejected(response.status)
                }
            };

            if !error.is_transient() {
                tracing::debug!("GET {} rejected: {}", url, error);
                return Err(error);
            }

            tracing::warn!(
                "GET {} failed on attempt {}/{}: {}",
                url,
                attempt + 1,
                attempts,
                error
            );
            last_error = error;

            if attempt + 1 < attempts {
                let delay = hint
                    .map(|d| d.min(self.policy.max_delay))
                    .unwrap_or_else(|| self.policy.backoff(attempt));
                tracing::debug!("Retrying {} after {:?}", url, delay);
                tokio::time::sleep(delay).await;
            }
        }

        Err(last_error)
    }
}
