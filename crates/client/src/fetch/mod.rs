//! Origin fetch pipeline.
//!
//! The origin is the external HTTP server that actually serves the site. The
//! edge worker only needs one capability from it: issue a request and get a
//! response back, or learn that no response could be obtained.
//!
//! ### Error statuses are responses
//! - 404 and 5xx come back as `Ok`; the worker decides what to do with them.
//! - `Err` means DNS, connect, timeout or body-read failure.
//!
//! ### Limits
//! - Max redirects: 5 (configurable)
//! - No body size cap here: a response that arrived is always handed back.
//!   Only install enforces `max_bytes`, on what it stores.

pub mod url;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use waystation_core::{AppConfig, EdgeRequest, EdgeResponse, Error};

pub use url::{UrlError, resolve};

/// Why the origin produced no response.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// DNS resolution or TCP/TLS connect failed.
    #[error("connection failed: {0}")]
    Connect(Arc<reqwest::Error>),

    /// Any other transport failure.
    #[error("network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::Connect(Arc::new(err))
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// The origin server, as seen from the edge.
#[async_trait]
pub trait Origin: Send + Sync {
    /// Issue a single network attempt for the request.
    async fn fetch(&self, request: &EdgeRequest) -> Result<EdgeResponse, FetchError>;
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "waystation/0.1")
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "waystation/0.1".to_string(),
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            timeout: config.timeout(),
            max_redirects: config.max_redirects,
        }
    }
}

/// HTTP client for the origin.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::InvalidInput(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait]
impl Origin for FetchClient {
    /// Forward the request unmodified, with default cache directives.
    async fn fetch(&self, request: &EdgeRequest) -> Result<EdgeResponse, FetchError> {
        let start = Instant::now();

        let response = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status = status.as_u16(),
            bytes = body.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "origin responded"
        );

        Ok(EdgeResponse { status, headers, body })
    }
}
