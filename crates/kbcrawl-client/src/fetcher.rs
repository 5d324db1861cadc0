use std::time::Duration;

use kbcrawl_core::error::CrawlError;
use kbcrawl_core::traits::Fetcher;
use reqwest::Client;

pub(crate) const USER_AGENT: &str = concat!("kbcrawl/", env!("CARGO_PKG_VERSION"));

/// Map a reqwest transport error onto the crawl taxonomy.
pub(crate) fn transport_error(e: reqwest::Error, timeout: Duration) -> CrawlError {
    if e.is_timeout() {
        CrawlError::Timeout(timeout.as_millis() as u64)
    } else if e.is_connect() {
        CrawlError::NetworkError(format!("Connection failed: {e}"))
    } else {
        CrawlError::FetchError(e.to_string())
    }
}

pub(crate) fn build_client(timeout: Duration) -> Result<Client, CrawlError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| CrawlError::FetchError(format!("Failed to build HTTP client: {e}")))
}

/// HTTP fetcher for raw text resources such as sitemaps.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout: Duration,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, CrawlError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, CrawlError> {
        Ok(Self {
            client: build_client(timeout)?,
            timeout,
        })
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<String, CrawlError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::FetchError(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }

        response
            .text()
            .await
            .map_err(|e| CrawlError::FetchError(format!("Failed to read response body: {e}")))
    }
}
