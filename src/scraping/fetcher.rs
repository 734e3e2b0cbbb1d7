//! HTTP fetch engine
//!
//! Plain GET with a bounded timeout. Anything but `200 OK` is an error; the
//! body is decoded with the charset named in `Content-Type` (UTF-8 when the
//! header does not name one).

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

use crate::config::ScrapingConfig;

/// Errors that can occur during fetching
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} for {url}")]
    BadStatus { url: String, status: u16 },
    #[error("Content too large: {0} bytes")]
    ContentTooLarge(usize),
}

impl FetchError {
    /// Client errors and oversized pages will not change on retry
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Http(_) => false,
            Self::BadStatus { status, .. } => (400..500).contains(status) && *status != 429,
            Self::ContentTooLarge(_) => true,
        }
    }
}

/// Result of a successful fetch
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// The fetched URL (may differ from request due to redirects)
    pub final_url: Url,
    /// Decoded body
    pub body: String,
    /// Raw `Content-Type` header, if any
    pub content_type: Option<String>,
    /// Charset used to decode the body
    pub charset: String,
    /// Time taken to fetch
    pub fetch_duration: Duration,
}

/// Configuration for the fetch engine
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    /// Whole-request timeout
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Maximum response size (bytes)
    pub max_content_size: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&ScrapingConfig::default())
    }
}

impl From<&ScrapingConfig> for FetchConfig {
    fn from(cfg: &ScrapingConfig) -> Self {
        Self {
            user_agent: cfg.user_agent.clone(),
            timeout: Duration::from_secs(cfg.request_timeout_secs),
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
            max_content_size: cfg.max_content_size,
            max_redirects: cfg.max_redirects,
        }
    }
}

/// Anything that can turn a URL into a decoded page
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchResult, FetchError>;
}

/// Fetch statistics
#[derive(Debug, Clone, Default)]
pub struct FetchStats {
    pub total_fetches: u64,
    pub successes: u64,
    pub failures: u64,
    /// Average fetch time of successful fetches (ms)
    pub avg_fetch_time_ms: f64,
}

/// reqwest-backed fetch engine
pub struct FetchEngine {
    http_client: reqwest::Client,
    config: FetchConfig,
    stats: Mutex<FetchStats>,
}

/// Charset named by a `Content-Type` header value
pub fn charset_from_content_type(content_type: Option<&str>) -> String {
    content_type
        .and_then(|ct| {
            ct.split(';').skip(1).find_map(|param| {
                let (key, value) = param.split_once('=')?;
                if key.trim().eq_ignore_ascii_case("charset") {
                    let value = value.trim().trim_matches('"').trim_matches('\'');
                    (!value.is_empty()).then(|| value.to_lowercase())
                } else {
                    None
                }
            })
        })
        .unwrap_or_else(|| "utf-8".to_string())
}

/// Decode with the named charset, falling back to UTF-8 for unknown labels.
/// A byte-order mark overrides the label.
fn decode_body(raw: &[u8], charset: &str) -> String {
    let encoding = encoding_rs::Encoding::for_label(charset.as_bytes()).unwrap_or(encoding_rs::UTF_8);
    let (text, _, _) = encoding.decode(raw);
    text.into_owned()
}

impl FetchEngine {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(&config.user_agent)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            http_client,
            config,
            stats: Mutex::new(FetchStats::default()),
        })
    }

    async fn fetch_http(&self, url: &Url) -> Result<FetchResult, FetchError> {
        let start = Instant::now();
        let mut response = self.http_client.get(url.as_str()).send().await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::BadStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.config.max_content_size {
                return Err(FetchError::ContentTooLarge(len as usize));
            }
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let charset = charset_from_content_type(content_type.as_deref());

        // chunked and compressed bodies carry no usable length up front
        let mut raw: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let size = raw.len() + chunk.len();
            if size > self.config.max_content_size {
                return Err(FetchError::ContentTooLarge(size));
            }
            raw.extend_from_slice(&chunk);
        }
        let body = decode_body(&raw, &charset);

        Ok(FetchResult {
            final_url,
            body,
            content_type,
            charset,
            fetch_duration: start.elapsed(),
        })
    }

    fn record(&self, result: &Result<FetchResult, FetchError>) {
        let mut stats = self.stats.lock();
        stats.total_fetches += 1;
        match result {
            Ok(r) => {
                stats.successes += 1;
                let ms = r.fetch_duration.as_secs_f64() * 1000.0;
                let n = stats.successes as f64;
                stats.avg_fetch_time_ms = (stats.avg_fetch_time_ms * (n - 1.0) + ms) / n;
            }
            Err(_) => stats.failures += 1,
        }
    }

    pub fn stats(&self) -> FetchStats {
        self.stats.lock().clone()
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait]
impl Fetch for FetchEngine {
    async fn fetch(&self, url: &Url) -> Result<FetchResult, FetchError> {
        let result = self.fetch_http(url).await;
        if let Err(ref e) = result {
            tracing::debug!("Fetch of {} failed: {}", url, e);
        }
        self.record(&result);
        result
    }
}
