use crate::error::{Error, Result};
use reqwest::{header, Client, Response, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// HTTP fetcher with retry logic and a body size cap
pub struct Fetcher {
    client: Client,
    max_retries: u32,
    initial_backoff: Duration,
    max_page_size: usize,
}

#[derive(Debug)]
pub struct FetchResult {
    pub content: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub content_type: Option<String>,
}

/// Outcome of a conditional request
#[derive(Debug)]
pub enum FetchOutcome {
    /// Content was fetched (new or modified)
    Fetched(FetchResult),
    /// Server answered 304
    NotModified,
}

impl Fetcher {
    pub fn new(user_agent: String, max_page_size: usize) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            client,
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_page_size,
        })
    }

    /// Shorten the retry backoff, mostly useful against local test servers
    pub fn with_backoff(mut self, max_retries: u32, initial_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.initial_backoff = initial_backoff;
        self
    }

    /// Fetch a page unconditionally
    pub async fn fetch(&self, url: &str) -> Result<FetchResult> {
        match self.fetch_with_conditions(url, None, None).await? {
            FetchOutcome::Fetched(result) => Ok(result),
            // Only possible when the server ignores the missing validators
            FetchOutcome::NotModified => Err(Error::Extract(format!(
                "Unexpected 304 Not Modified for {url}"
            ))),
        }
    }

    /// Fetch a URL with conditional request headers (ETag, Last-Modified)
    pub async fn fetch_with_conditions(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<FetchOutcome> {
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            match self.fetch_once(url, etag, last_modified).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if retries < self.max_retries && Self::is_retryable(&e) => {
                    retries += 1;
                    warn!(
                        "Fetch of {} failed (attempt {}/{}): {}. Retrying in {:?}",
                        url, retries, self.max_retries, e, backoff
                    );
                    sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<FetchOutcome> {
        debug!("Fetching: {}", url);

        let mut request = self.client.get(url);

        if let Some(etag) = etag {
            request = request.header(header::IF_NONE_MATCH, etag);
        }

        if let Some(last_modified) = last_modified {
            request = request.header(header::IF_MODIFIED_SINCE, last_modified);
        }

        let response = request.send().await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            debug!("Not modified: {}", url);
            return Ok(FetchOutcome::NotModified);
        }

        if !response.status().is_success() {
            return Err(Error::Extract(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let header_value = |name: header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };

        let new_etag = header_value(header::ETAG);
        let new_last_modified = header_value(header::LAST_MODIFIED);
        let content_type = header_value(header::CONTENT_TYPE);

        if let Some(content_length) = response.content_length() {
            if content_length > self.max_page_size as u64 {
                return Err(Error::Validation(format!(
                    "Response size {} exceeds maximum {}",
                    content_length, self.max_page_size
                )));
            }
        }

        let content = self.read_with_limit(response).await?;

        Ok(FetchOutcome::Fetched(FetchResult {
            content,
            etag: new_etag,
            last_modified: new_last_modified,
            content_type,
        }))
    }

    async fn read_with_limit(&self, response: Response) -> Result<String> {
        let bytes = response.bytes().await?;

        if bytes.len() > self.max_page_size {
            return Err(Error::Validation(format!(
                "Response size {} exceeds maximum {}",
                bytes.len(),
                self.max_page_size
            )));
        }

        // News sites occasionally serve stray invalid bytes; keep what decodes
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn is_retryable(error: &Error) -> bool {
        match error {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

/// Rate limiter for respecting crawl delays
pub struct RateLimiter {
    delay: Duration,
    last_request: tokio::sync::Mutex<Option<tokio::time::Instant>>,
}

impl RateLimiter {
    pub fn new(requests_per_second: u64) -> Self {
        let delay = Duration::from_millis(1000 / requests_per_second.max(1));
        Self {
            delay,
            last_request: tokio::sync::Mutex::new(None),
        }
    }

    /// Wait if necessary to respect rate limit
    pub async fn wait(&self) {
        // Compute the wait under the lock, sleep without it
        let wait_time = {
            let last = self.last_request.lock().await;
            last.and_then(|last_time| self.delay.checked_sub(last_time.elapsed()))
        };

        if let Some(wait) = wait_time {
            debug!("Rate limiting: waiting {:?}", wait);
            sleep(wait).await;
        }

        let mut last = self.last_request.lock().await;
        *last = Some(tokio::time::Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher(max_size: usize) -> Fetcher {
        Fetcher::new("aggsum-test/1.0".to_string(), max_size)
            .unwrap()
            .with_backoff(0, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_rate_limiter() {
        let limiter = RateLimiter::new(2);

        let start = tokio::time::Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_fetch_returns_body_and_validators() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/feed.rss")
            .with_status(200)
            .with_header("etag", "\"abc\"")
            .with_header("content-type", "application/rss+xml")
            .with_body("<rss></rss>")
            .create_async()
            .await;

        let url = format!("{}/feed.rss", server.url());
        let result = fetcher(1024).fetch(&url).await.unwrap();

        mock.assert_async().await;
        assert_eq!(result.content, "<rss></rss>");
        assert_eq!(result.etag.as_deref(), Some("\"abc\""));
    }

    #[tokio::test]
    async fn test_not_modified_outcome() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/feed.rss")
            .match_header("if-none-match", "\"abc\"")
            .with_status(304)
            .create_async()
            .await;

        let url = format!("{}/feed.rss", server.url());
        let outcome = fetcher(1024)
            .fetch_with_conditions(&url, Some("\"abc\""), None)
            .await
            .unwrap();

        assert!(matches!(outcome, FetchOutcome::NotModified));
    }

    #[tokio::test]
    async fn test_error_status_and_size_limit() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;
        let _big = server
            .mock("GET", "/big")
            .with_status(200)
            .with_body("x".repeat(2048))
            .create_async()
            .await;

        let fetcher = fetcher(1024);
        assert!(fetcher
            .fetch(&format!("{}/missing", server.url()))
            .await
            .is_err());
        assert!(matches!(
            fetcher.fetch(&format!("{}/big", server.url())).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_decoded_lossily() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/page")
            .with_status(200)
            .with_body(vec![b'o', b'k', 0xff])
            .create_async()
            .await;

        let result = fetcher(1024)
            .fetch(&format!("{}/page", server.url()))
            .await
            .unwrap();
        assert!(result.content.starts_with("ok"));
    }
}
