mod fetch;
mod retry;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

// Re-export from fetch
pub use fetch::{FetchError, Fetcher, DEFAULT_USER_AGENT};
// Re-export from retry
pub use retry::RetryPolicy;

/// Headers carrying `Authorization: Bearer <key>` when a key is configured
pub fn auth_headers(api_key: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(key) = api_key.map(str::trim).filter(|key| !key.is_empty()) {
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", key)) {
            headers.insert(AUTHORIZATION, value);
        }
    }
    headers
}
