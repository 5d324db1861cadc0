use thiserror::Error;

/// Error types for a crawl run.
///
/// Only [`CrawlError::ConfigValidation`] is fatal to a run. Every other
/// variant is scoped to the page or document that produced it.
#[derive(Error, Debug)]
pub enum CrawlError {
    /// Required configuration is missing or malformed.
    #[error("Invalid crawl configuration: {0}")]
    ConfigValidation(String),

    /// The page could not be loaded (HTTP failure, bad URL, blocked resource).
    #[error("Fetch error: {0}")]
    FetchError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Navigation or request timed out.
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// The rendering engine failed (browser crash, script evaluation error).
    #[error("Renderer error: {0}")]
    RendererError(String),

    /// The content selector never matched within the wait timeout.
    #[error("Selector '{selector}' did not appear within {timeout_ms} ms")]
    SelectorTimeout { selector: String, timeout_ms: u64 },

    /// The sitemap could not be parsed.
    #[error("Sitemap error: {0}")]
    SitemapError(String),

    /// HTML-to-text conversion failed.
    #[error("Cleaner error: {0}")]
    CleanerError(String),

    /// The upload request could not be sent or its response not read.
    #[error("Upload error: {0}")]
    UploadError(String),

    /// The ingestion endpoint answered with a non-success status.
    #[error("Upload rejected (HTTP {status}): {body}")]
    UploadRejected { status: u16, body: String },

    /// The caller-supplied page hook failed.
    #[error("Page hook error: {0}")]
    HookError(String),

    /// Writing crawl results to local storage failed.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl CrawlError {
    /// Returns true if this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CrawlError::ConfigValidation(_))
    }

    /// Returns true if this error happened while acquiring the page.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            CrawlError::FetchError(_)
                | CrawlError::NetworkError(_)
                | CrawlError::Timeout(_)
                | CrawlError::RendererError(_)
        )
    }
}

impl From<std::io::Error> for CrawlError {
    fn from(e: std::io::Error) -> Self {
        CrawlError::StorageError(e.to_string())
    }
}
