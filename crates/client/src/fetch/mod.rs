//! Bounded-retry fetch pipeline for image payloads.
//!
//! ### Per attempt
//! - Shut down or domain blocked: fall back without touching the network.
//! - Connect (connect timeout), read headers.
//! - 403 / 404 / 429 and other client errors: record a domain failure, fall back.
//! - Declared `content-length` above the ceiling: fall back.
//! - Body streamed chunk by chunk (read timeout) with a hard byte ceiling.
//!
//! ### Retries
//! - Timeouts, network errors and 5xx are retried up to `max_retries` times,
//!   sleeping `backoff * 2^attempt` in between.
//! - Exhaustion records one domain failure and falls back.
//!
//! A fallback is the original URL, unchanged. Fetch errors never reach the
//! caller.

pub mod breaker;
pub mod image;
pub mod url;

use bytes::{Bytes, BytesMut};
use reqwest::{Client, header};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub use self::breaker::{DomainCircuitBreaker, is_uncooperative};
pub use self::url::{UrlError, canonicalize, domain_of};

use datavault_core::{CacheConfig, Error};

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "datavault/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 10MB)
    pub max_bytes: usize,

    /// TCP connect timeout (default: 5s)
    pub connect_timeout: Duration,

    /// Timeout of each read while waiting for headers or body (default: 10s)
    pub read_timeout: Duration,

    /// Retries after the first attempt (default: 3)
    pub max_retries: u32,

    /// Base delay of the exponential backoff (default: 500ms)
    pub retry_backoff: Duration,

    /// Failures before a domain is blocked (default: 3)
    pub domain_failure_threshold: u32,

    /// How long a blocked domain stays blocked (default: 1h)
    pub domain_block_duration: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for FetchConfig {
    fn from(config: &CacheConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_payload_bytes,
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
            domain_failure_threshold: config.domain_failure_threshold,
            domain_block_duration: config.domain_block_duration(),
        }
    }
}

impl FetchConfig {
    /// Delay before retry number `attempt + 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Errors from a single fetch attempt.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] UrlError),

    #[error("domain blocked: {0}")]
    DomainBlocked(String),

    #[error("fetch client shut down")]
    ShutDown,

    #[error("request timeout")]
    Timeout,

    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    #[error("HTTP error: {status}")]
    HttpError { status: u16 },

    #[error("payload too large: {size} bytes exceeds {max}")]
    TooLarge { size: u64, max: usize },

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { FetchError::Timeout } else { FetchError::Network(Arc::new(err)) }
    }
}

impl FetchError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Network(_) => true,
            FetchError::HttpError { status } => *status >= 500,
            _ => false,
        }
    }

    /// Failures that count toward blocking the domain once final.
    pub fn counts_against_domain(&self) -> bool {
        matches!(self, FetchError::Timeout | FetchError::Network(_) | FetchError::HttpError { .. })
    }

    /// Whether the fetch was skipped without a network attempt.
    pub fn is_skip(&self) -> bool {
        matches!(self, FetchError::DomainBlocked(_) | FetchError::ShutDown)
    }
}

impl From<FetchError> for Error {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::InvalidUrl(e) => Error::InvalidUrl(e.to_string()),
            FetchError::DomainBlocked(d) => Error::DomainBlocked(d),
            FetchError::ShutDown => Error::ShuttingDown,
            FetchError::Timeout => Error::FetchTimeout("request timeout".into()),
            FetchError::TooLarge { size, max } => Error::FetchTooLarge(format!("{size} bytes exceeds {max}")),
            other => Error::HttpError(other.to_string()),
        }
    }
}

/// A successfully fetched payload.
#[derive(Debug, Clone)]
pub struct FetchedPayload {
    /// The canonical URL fetched
    pub url: ::url::Url,
    /// Content-Type header
    pub content_type: Option<String>,
    /// Response body bytes
    pub bytes: Bytes,
    /// Attempts used, 1-based
    pub attempts: u32,
    /// Time taken by the successful attempt in milliseconds
    pub fetch_ms: u64,
}

impl FetchedPayload {
    pub fn to_data_uri(&self) -> String {
        image::to_data_uri(self.content_type.as_deref(), &self.bytes)
    }
}

/// Result of [`FetchClient::fetch`].
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Fetched(FetchedPayload),
    /// The original reference, to be used unchanged.
    Fallback { url: String, reason: FetchError },
}

impl FetchOutcome {
    pub fn is_fetched(&self) -> bool {
        matches!(self, FetchOutcome::Fetched(_))
    }
}

/// HTTP fetch client with retries and a per-domain circuit breaker.
///
/// The underlying `reqwest::Client` is built lazily and dropped on `close`,
/// both under the same lock.
#[derive(Debug)]
pub struct FetchClient {
    http: Mutex<Option<Client>>,
    config: FetchConfig,
    breaker: Arc<DomainCircuitBreaker>,
    shut_down: AtomicBool,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Self {
        let breaker = Arc::new(DomainCircuitBreaker::new(config.domain_failure_threshold, config.domain_block_duration));
        Self { http: Mutex::new(None), config, breaker, shut_down: AtomicBool::new(false) }
    }

    async fn http(&self) -> Result<Client, FetchError> {
        let mut slot = self.http.lock().await;
        if self.is_shut_down() {
            return Err(FetchError::ShutDown);
        }
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .user_agent(&self.config.user_agent)
            .connect_timeout(self.config.connect_timeout)
            .read_timeout(self.config.read_timeout)
            .timeout(self.config.connect_timeout + self.config.read_timeout)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        tracing::debug!("built HTTP client");
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Fetch `url_str` with retries. Never fails: every failure ends in
    /// [`FetchOutcome::Fallback`] carrying the input unchanged.
    pub async fn fetch(&self, url_str: &str) -> FetchOutcome {
        let fallback = |reason: FetchError| FetchOutcome::Fallback { url: url_str.to_string(), reason };

        let url = match canonicalize(url_str) {
            Ok(url) => url,
            Err(e) => return fallback(e.into()),
        };
        let domain = domain_of(&url);

        if let Err(reason) = self.gate(&domain).await {
            tracing::debug!(url = url_str, domain, %reason, "fetch skipped");
            return fallback(reason);
        }

        let mut attempt = 0u32;
        loop {
            if self.is_shut_down() {
                return fallback(FetchError::ShutDown);
            }

            match self.attempt(&url, None).await {
                Ok(mut payload) => {
                    self.breaker.record_success(&domain).await;
                    payload.attempts = attempt + 1;
                    return FetchOutcome::Fetched(payload);
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.backoff(attempt);
                    tracing::warn!(
                        url = url_str,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.counts_against_domain() {
                        self.breaker.record_failure(&domain).await;
                    }
                    tracing::warn!(url = url_str, attempts = attempt + 1, error = %e, "fetch gave up");
                    return fallback(e);
                }
            }
        }
    }

    /// One attempt with a tight overall `timeout`, no retries and no breaker
    /// bookkeeping. Used for placeholders.
    pub async fn fetch_once(&self, url_str: &str, timeout: Duration) -> Result<FetchedPayload, FetchError> {
        let url = canonicalize(url_str)?;
        self.gate(&domain_of(&url)).await?;
        self.attempt(&url, Some(timeout)).await
    }

    async fn gate(&self, domain: &str) -> Result<(), FetchError> {
        if self.is_shut_down() {
            return Err(FetchError::ShutDown);
        }
        if self.breaker.is_blocked(domain).await {
            return Err(FetchError::DomainBlocked(domain.to_string()));
        }
        Ok(())
    }

    async fn attempt(&self, url: &::url::Url, timeout: Option<Duration>) -> Result<FetchedPayload, FetchError> {
        let start = Instant::now();
        let http = self.http().await?;

        let mut request = http
            .get(url.as_str())
            .header(header::ACCEPT, "image/avif,image/webp,image/*,*/*;q=0.8");
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let mut response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            if is_uncooperative(status) {
                tracing::warn!(url = %url, status = status.as_u16(), "uncooperative response");
            }
            return Err(FetchError::HttpError { status: status.as_u16() });
        }

        let max = self.config.max_bytes;
        if let Some(len) = response.content_length()
            && len > max as u64
        {
            return Err(FetchError::TooLarge { size: len, max });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > max {
                return Err(FetchError::TooLarge { size: (body.len() + chunk.len()) as u64, max });
            }
            body.extend_from_slice(&chunk);
        }

        let fetch_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(url = %url, status = status.as_u16(), fetch_ms, bytes = body.len(), "fetched");

        Ok(FetchedPayload { url: url.clone(), content_type, bytes: body.freeze(), attempts: 1, fetch_ms })
    }

    /// Stop new fetches. In-flight attempts keep their client clone and
    /// finish or time out on their own.
    pub fn begin_shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }

    /// Stop new fetches and release the shared HTTP client.
    pub async fn close(&self) {
        self.begin_shutdown();
        let mut slot = self.http.lock().await;
        if slot.take().is_some() {
            tracing::debug!("closed HTTP client");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub fn breaker(&self) -> &Arc<DomainCircuitBreaker> {
        &self.breaker
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "datavault/0.1");
        assert_eq!(config.max_bytes, 10 * 1024 * 1024);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Duration::from_secs(10));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.domain_failure_threshold, 3);
    }

    #[test]
    fn test_backoff_is_exponential() {
        let config = FetchConfig { retry_backoff: Duration::from_millis(100), ..Default::default() };
        assert_eq!(config.backoff(0), Duration::from_millis(100));
        assert_eq!(config.backoff(1), Duration::from_millis(200));
        assert_eq!(config.backoff(3), Duration::from_millis(800));
    }

    #[test]
    fn test_error_classification() {
        assert!(FetchError::Timeout.is_retryable());
        assert!(FetchError::HttpError { status: 503 }.is_retryable());
        assert!(!FetchError::HttpError { status: 404 }.is_retryable());
        assert!(!FetchError::TooLarge { size: 10, max: 1 }.is_retryable());
        assert!(!FetchError::TooLarge { size: 10, max: 1 }.counts_against_domain());
        assert!(FetchError::HttpError { status: 429 }.counts_against_domain());
        assert!(FetchError::DomainBlocked("a".into()).is_skip());
    }

    #[test]
    fn test_error_into_core_error() {
        let err: Error = FetchError::TooLarge { size: 11, max: 10 }.into();
        assert!(matches!(err, Error::FetchTooLarge(_)));
        let err: Error = FetchError::DomainBlocked("a.example".into()).into();
        assert!(matches!(err, Error::DomainBlocked(d) if d == "a.example"));
    }

    #[tokio::test]
    async fn test_invalid_url_falls_back() {
        let client = FetchClient::new(FetchConfig::default());
        match client.fetch("ftp://example.com/a.png").await {
            FetchOutcome::Fallback { url, reason } => {
                assert_eq!(url, "ftp://example.com/a.png");
                assert!(matches!(reason, FetchError::InvalidUrl(_)));
            }
            FetchOutcome::Fetched(_) => panic!("expected fallback"),
        }
    }

    #[tokio::test]
    async fn test_blocked_domain_skips_network() {
        let client = FetchClient::new(FetchConfig { domain_failure_threshold: 1, ..Default::default() });
        client.breaker().record_failure("blocked.invalid").await;

        match client.fetch("https://blocked.invalid/a.png").await {
            FetchOutcome::Fallback { url, reason } => {
                assert_eq!(url, "https://blocked.invalid/a.png");
                assert!(matches!(reason, FetchError::DomainBlocked(_)));
            }
            FetchOutcome::Fetched(_) => panic!("expected fallback"),
        }
        assert!(client.http.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_client_short_circuits() {
        let client = FetchClient::new(FetchConfig::default());
        client.close().await;
        client.close().await;

        match client.fetch("https://example.com/a.png").await {
            FetchOutcome::Fallback { reason, .. } => assert!(matches!(reason, FetchError::ShutDown)),
            FetchOutcome::Fetched(_) => panic!("expected fallback"),
        }
        assert!(matches!(client.http().await, Err(FetchError::ShutDown)));
    }
}
