//! # OffKit Net
//!
//! Request/response model and HTTP fetching for the OffKit cache engine.
//!
//! ## Design Goals
//!
//! 1. **Async HTTP**: Non-blocking network requests
//! 2. **Fetch seam**: The [`Fetcher`] trait so callers can substitute the
//!    network in tests
//! 3. **Opaque-allowed requests**: `no-cors` style mode markers for
//!    cross-origin prefetching
//!
//! HTTP error statuses (4xx/5xx) are valid responses here, never `Err`; only
//! transport-level failures surface as errors.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;

/// Errors that can occur while fetching.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Fetch mode for a request.
///
/// `NoCors` marks a request as opaque-allowed: the caller accepts the
/// response without cross-origin validation. Outside a browser sandbox the
/// mode carries no enforcement of its own; it is preserved so embedders can
/// apply policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Cross-origin requests require CORS permission.
    #[default]
    Cors,
    /// Cross-origin responses are accepted opaque.
    NoCors,
    /// Only same-origin requests are allowed.
    SameOrigin,
}

/// An outgoing resource request.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub mode: FetchMode,
}

impl Request {
    /// Create a GET request with default mode.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            mode: FetchMode::default(),
        }
    }

    /// Set the fetch mode.
    pub fn mode(mut self, mode: FetchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// A fetched response.
#[derive(Debug, Clone)]
pub struct Response {
    /// Final URL after redirects.
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    /// Whether the status is 2xx.
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Whether the status indicates a client or server error (>= 400).
    pub fn is_error_status(&self) -> bool {
        self.status.as_u16() >= 400
    }
}

/// Derive a cache-busted URL by appending a `cache-bust` query parameter.
///
/// The returned URL exists only to defeat intermediate HTTP caches during a
/// bulk prefetch; the original URL remains the storage key.
pub fn cache_busted(url: &Url, timestamp_ms: u64) -> Url {
    let mut busted = url.clone();
    busted
        .query_pairs_mut()
        .append_pair("cache-bust", &timestamp_ms.to_string());
    busted
}

/// The network seam: anything that can turn a [`Request`] into a
/// [`Response`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the request. HTTP error statuses are `Ok`; only transport
    /// failures are `Err`.
    async fn fetch(&self, request: Request) -> Result<Response, NetError>;
}

/// HTTP fetcher configuration.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// User agent string.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum redirects to follow.
    pub max_redirects: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: "OffKit/0.1".to_string(),
            timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

/// Live HTTP [`Fetcher`] backed by reqwest.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Build a fetcher from configuration.
    pub fn new(config: FetcherConfig) -> Result<Self, NetError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: Request) -> Result<Response, NetError> {
        debug!(url = %request.url, method = %request.method, mode = ?request.mode, "Fetching resource");

        let mut req_builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in request.headers.iter() {
            req_builder = req_builder.header(name, value);
        }

        let response = req_builder.send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;

        trace!(
            url = %url,
            status = %status,
            body_len = body.len(),
            "Response received"
        );

        Ok(Response {
            url,
            status,
            headers,
            body,
        })
    }
}
