//! Rate-limited HTTP client for provider API calls
//!
//! Enforces a minimum interval between requests to the same host and a
//! global concurrency limit, attaches the API key and maps HTTP failures
//! onto `SyncError` so the retry manager can classify them.

use crate::config::RateLimitConfig;
use crate::error::SyncError;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

/// HTTP client with rate limiting capabilities
#[derive(Debug)]
pub struct HttpClientWithRateLimit {
    client: Client,
    semaphore: Arc<Semaphore>,
    last_request: Arc<Mutex<HashMap<String, Instant>>>,
    config: RateLimitConfig,
}

impl HttpClientWithRateLimit {
    /// Create a rate-limited client; `api_key` is sent as the Authorization header
    pub fn new(
        config: RateLimitConfig,
        request_timeout: Duration,
        api_key: Option<&str>,
    ) -> Result<Self, SyncError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|e| SyncError::InvalidData(format!("invalid API key header: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(request_timeout)
            .default_headers(headers)
            .user_agent(concat!("league-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(client, config))
    }

    /// Create a rate-limited HTTP client with a custom reqwest Client
    pub fn with_client(client: Client, config: RateLimitConfig) -> Self {
        Self {
            client,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            last_request: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// GET and decode a JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<T, SyncError> {
        let body = self.get(url, query).await?;
        serde_json::from_slice(&body).map_err(|e| {
            warn!(url = url, error = %e, "Failed to decode provider response");
            SyncError::InvalidData(e.to_string())
        })
    }

    /// Perform a GET request and return the raw body
    pub async fn get(&self, url: &str, query: &[(String, String)]) -> Result<Bytes, SyncError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| SyncError::Network("HTTP client closed".to_string()))?;

        self.wait_for_rate_limit(url).await;

        debug!(url = url, params = query.len(), "Sending HTTP GET request");

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(map_transport_error)?;

        match response.status() {
            StatusCode::OK => {
                let body = response.bytes().await.map_err(map_transport_error)?;
                debug!(url = url, body_size = body.len(), "Received response");
                Ok(body)
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let wait = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(self.config.rate_limit_wait_secs);

                warn!(url = url, retry_after = wait, "Rate limited by upstream");
                Err(SyncError::RateLimited(wait))
            }
            StatusCode::NOT_FOUND => {
                debug!(url = url, "Resource not found (404)");
                Err(SyncError::NotFound)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!(url = url, status = ?response.status(), "Unauthorized");
                Err(SyncError::Unauthorized)
            }
            status if status.is_server_error() => {
                warn!(url = url, status = status.as_u16(), "Server error");
                Err(SyncError::ServerError(status.as_u16()))
            }
            status => {
                warn!(url = url, status = status.as_u16(), "Unexpected status");
                Err(SyncError::ServerError(status.as_u16()))
            }
        }
    }

    /// Wait for the rate limit interval to pass for the given URL's host
    async fn wait_for_rate_limit(&self, url: &str) {
        let domain = extract_domain(url);
        let min_interval = Duration::from_millis(self.config.min_interval_ms);
        if min_interval.is_zero() {
            return;
        }

        let mut last_requests = self.last_request.lock().await;

        if let Some(last) = last_requests.get(&domain) {
            let elapsed = last.elapsed();
            if elapsed < min_interval {
                let wait_time = min_interval - elapsed;
                debug!(
                    domain = domain,
                    wait_ms = wait_time.as_millis() as u64,
                    "Waiting for rate limit"
                );
                drop(last_requests);
                tokio::time::sleep(wait_time).await;
                last_requests = self.last_request.lock().await;
            }
        }

        last_requests.insert(domain, Instant::now());
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Number of free concurrent request slots
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

fn map_transport_error(e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::NetworkTimeout
    } else if e.is_connect() {
        SyncError::ConnectionRefused
    } else {
        SyncError::Network(e.to_string())
    }
}

/// Extract host from URL for rate limiting purposes
fn extract_domain(url: &str) -> String {
    url.split("://")
        .nth(1)
        .and_then(|s| s.split('/').next())
        .unwrap_or(url)
        .to_string()
}
