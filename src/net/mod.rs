//! Network utilities: HTTP fetching, rate limiting and content parsing.
//!
//! This module provides the networking layer used by the site engine:
//!
//! - **HTTP Client**: a global, pooled `reqwest` client wrapped per site with
//!   the site's request headers
//! - **Fetcher**: the trait the engine fetches through, so tests can swap in
//!   canned documents
//! - **Rate Limiting**: a minimum-interval gate shared by the callers it is
//!   handed to
//! - **Parsing helpers**: [`html`], [`json`] and [`url`]
//!
//! Requests are never retried here. Failures surface as typed errors and
//! [`Error::is_retryable`](crate::Error::is_retryable) tells callers which
//! ones are worth repeating.
//!
//! # Examples
//!
//! ```rust,no_run
//! use yomikomi::net::{Fetcher, HttpClient};
//!
//! # async fn example() -> yomikomi::Result<()> {
//! let client = HttpClient::new("my_source")
//!     .with_header("Referer", "https://example.com/");
//!
//! let html = client.get_text("https://example.com").await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use once_cell::sync::Lazy;
use reqwest::{
    Client, StatusCode,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use std::time::Duration;
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, instrument, warn};

use crate::error::{Error, Result};

pub mod html;
pub mod json;
pub mod url;

/// User agent sent when a site does not configure its own.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

static CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(DEFAULT_USER_AGENT)
        .pool_max_idle_per_host(10)
        .gzip(true)
        .brotli(true)
        .build()
        .expect("Failed to build HTTP client")
});

/// Fetches documents by URL.
///
/// The engine only ever talks to the network through this trait.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `url` and returns the body as text.
    async fn get_text(&self, url: &str) -> Result<String>;
}

/// Minimum-interval rate limiter.
///
/// Callers are served one at a time: each [`wait`](RateLimiter::wait) returns
/// no earlier than `interval` after the previous one returned. Nothing is
/// ever rejected, late callers just wait longer.
///
/// A limiter is an explicit resource. Share it with `Arc` between the
/// engines that must be throttled together.
///
/// ```rust
/// use yomikomi::net::RateLimiter;
///
/// # async fn example() {
/// let limiter = RateLimiter::new(5000);
/// limiter.wait().await; // first call passes immediately
/// # }
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            last: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits for this caller's turn.
    ///
    /// The lock is held across the sleep, so concurrent callers queue up in
    /// arrival order.
    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// HTTP client bound to one site.
#[derive(Clone, Debug)]
pub struct HttpClient {
    source_id: String,
    headers: HeaderMap,
}

impl HttpClient {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Adds a header sent with every request. Invalid names or values are
    /// skipped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (name.parse::<HeaderName>(), value.parse::<HeaderValue>()) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => warn!(source = %self.source_id, header = name, "skipping invalid header"),
        }
        self
    }

    pub fn with_headers<'a>(self, headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        headers
            .into_iter()
            .fold(self, |client, (name, value)| client.with_header(name, value))
    }

    #[instrument(level = "debug", skip(self), fields(source = %self.source_id))]
    pub async fn get(&self, url: &str) -> Result<Bytes> {
        let response = CLIENT.get(url).headers(self.headers.clone()).send().await?;
        let status = response.status();
        debug!(status = status.as_u16(), "response");

        if status.is_success() {
            return Ok(response.bytes().await?);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(Error::rate_limit(retry_after));
        }

        Err(Error::Http {
            src: self.source_id.clone(),
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl Fetcher for HttpClient {
    async fn get_text(&self, url: &str) -> Result<String> {
        let bytes = self.get(url).await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::parse(format!("Invalid UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn limiter_spaces_concurrent_callers() {
        let limiter = Arc::new(RateLimiter::new(5000));
        let start = Instant::now();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.wait().await;
                    Instant::now()
                })
            })
            .collect();

        let mut times = Vec::new();
        for handle in handles {
            times.push(handle.await.unwrap() - start);
        }
        times.sort();

        assert!(times[0] < Duration::from_millis(5000));
        assert!(times[1] - times[0] >= Duration::from_millis(5000));
        assert!(times[2] - times[1] >= Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn limiter_does_not_wait_after_idle() {
        let limiter = RateLimiter::new(1000);
        limiter.wait().await;
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let before = Instant::now();
        limiter.wait().await;
        assert_eq!(Instant::now(), before);
    }

    #[test]
    fn invalid_headers_are_skipped() {
        let client = HttpClient::new("x")
            .with_header("Referer", "https://example.com/")
            .with_header("bad header", "v");
        assert_eq!(client.headers.len(), 1);
    }
}
