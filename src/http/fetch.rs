use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Proxy, Response, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};

use super::retry::RetryPolicy;
use crate::config::NetworkConfig;

/// User-Agent sent when neither the caller nor the config supplies one
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (iPad; CPU OS 12_2 like Mac OS X) \
    AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148";

/// Classified GET failure
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GET request timed out for {url}")]
    Timeout { url: String },

    #[error("This download requires authentication. Add an API key (`network.api_key`) to continue this download.")]
    Unauthorized,

    #[error("Not found: {url}")]
    NotFound { url: String },

    /// The server refused a `Range` request
    #[error("Requested range not satisfiable")]
    RangeNotSatisfiable,

    /// Non-2xx status that survived every retry
    #[error("GET request failed with {status}: {reason}")]
    Status { status: u16, reason: String },

    /// Connection-level failure that survived every retry
    #[error("GET request failed: {0}")]
    Transport(String),
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

/// GET-only HTTP client with default headers, proxy settings and step-back
/// retry. Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    retry: RetryPolicy,
    user_agent: HeaderValue,
}

impl Fetcher {
    /// Builds the client. Certificate verification is disabled: the remote
    /// host is trusted by configuration.
    pub fn new(network: &NetworkConfig) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_secs(network.timeout_secs);

        let mut builder = Client::builder()
            .danger_accept_invalid_certs(true)
            .connect_timeout(timeout)
            .read_timeout(timeout);

        if let Some(proxy) = network.proxy_http.as_deref().filter(|p| !p.is_empty()) {
            builder = builder.proxy(Proxy::http(proxy)?);
        }
        if let Some(proxy) = network.proxy_https.as_deref().filter(|p| !p.is_empty()) {
            builder = builder.proxy(Proxy::https(proxy)?);
        }

        let user_agent = HeaderValue::from_str(&network.user_agent).unwrap_or_else(|_| {
            warn!("Configured user agent is not a valid header value, using the default");
            HeaderValue::from_static(DEFAULT_USER_AGENT)
        });

        Ok(Self {
            client: builder.build()?,
            retry: RetryPolicy::from_config(network),
            user_agent,
        })
    }

    /// Replaces the retry schedule
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Default headers merged under the caller's; caller values win.
    pub fn merge_headers(&self, headers: Option<&HeaderMap>) -> HeaderMap {
        let mut merged = headers.cloned().unwrap_or_default();
        if !merged.contains_key(USER_AGENT) {
            merged.insert(USER_AGENT, self.user_agent.clone());
        }
        merged
    }

    /// Performs a GET and returns the streamed response on 2xx.
    ///
    /// 401, 404 and 416 fail immediately, as does a timeout. Any other
    /// failure is retried on the step-back schedule, for at most
    /// `max_retries + 1` attempts in total.
    pub async fn get(&self, url: &str, headers: Option<&HeaderMap>) -> Result<Response, FetchError> {
        let headers = self.merge_headers(headers);
        let mut retries = 0;

        loop {
            let failure = match self.client.get(url).headers(headers.clone()).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let reason = status.canonical_reason().unwrap_or("Unknown").to_string();
                    debug!("GET {} failed with error code {}: {}", url, status.as_u16(), reason);

                    match status {
                        StatusCode::UNAUTHORIZED => return Err(FetchError::Unauthorized),
                        StatusCode::RANGE_NOT_SATISFIABLE => {
                            return Err(FetchError::RangeNotSatisfiable)
                        }
                        StatusCode::NOT_FOUND => {
                            return Err(FetchError::NotFound { url: url.to_string() })
                        }
                        _ => FetchError::Status { status: status.as_u16(), reason },
                    }
                }
                Err(e) if e.is_timeout() => {
                    warn!("GET request timed out for {}", url);
                    return Err(FetchError::Timeout { url: url.to_string() });
                }
                Err(e) => FetchError::Transport(e.to_string()),
            };

            if retries >= self.retry.max_retries {
                warn!("Giving up on {} after {} attempts: {}", url, retries + 1, failure);
                return Err(failure);
            }

            let delay = self.retry.delay(retries);
            debug!("Retrying {} after {:?} ({})", url, delay, failure);
            // Step-back delay to allow the remote to recover
            tokio::time::sleep(delay).await;
            retries += 1;
        }
    }
}
