use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// A content selector, resolved from the configured string.
///
/// Strings starting with `/` are XPath expressions, anything else is CSS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Css(String),
    XPath(String),
}

impl Selector {
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with('/') {
            Selector::XPath(raw.to_string())
        } else {
            Selector::Css(raw.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Selector::Css(s) | Selector::XPath(s) => s,
        }
    }

    pub fn is_xpath(&self) -> bool {
        matches!(self, Selector::XPath(_))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cookie to inject before navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Actions applied to a page before it is rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationPolicy {
    /// Cookies scoped to the URL being loaded.
    pub cookies: Vec<Cookie>,
    /// Lower-cased file extensions (without the dot) whose requests are aborted.
    pub blocked_extensions: Vec<String>,
}

impl NavigationPolicy {
    pub fn new(cookies: Vec<Cookie>, extensions: &[String]) -> Self {
        let blocked_extensions = extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self {
            cookies,
            blocked_extensions,
        }
    }

    /// Whether a request for `url` must be aborted.
    pub fn blocks(&self, url: &str) -> bool {
        if self.blocked_extensions.is_empty() {
            return false;
        }
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(segment) = parsed.path().rsplit('/').next() else {
            return false;
        };
        let Some((_, ext)) = segment.rsplit_once('.') else {
            return false;
        };
        let ext = ext.to_ascii_lowercase();
        self.blocked_extensions.iter().any(|b| *b == ext)
    }

    /// Request URL wildcard patterns covering every blocked extension,
    /// with and without a query string.
    pub fn request_patterns(&self) -> Vec<String> {
        self.blocked_extensions
            .iter()
            .flat_map(|ext| [format!("*.{ext}"), format!("*.{ext}?*")])
            .collect()
    }
}

/// One successfully processed page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    pub title: String,
    pub url: String,
    pub content: String,
}

/// A document ready for delivery to the knowledge base.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub filename: String,
    pub content: String,
    pub api_key: String,
    pub project_id: String,
}

impl fmt::Debug for UploadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadTask")
            .field("filename", &self.filename)
            .field("content_len", &self.content.len())
            .field("api_key", &"<redacted>")
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// What the ingestion endpoint said about an accepted upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub http_status: u16,
    /// Document status reported by the endpoint (`status.type`), if any.
    pub status_type: Option<String>,
}

/// Totals for a finished crawl run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pages_dispatched: usize,
    pub pages_succeeded: usize,
    pub pages_failed: usize,
    /// Pages that redirected to a URL already crawled in this run.
    pub pages_skipped: usize,
    pub links_enqueued: usize,
    pub uploads_succeeded: usize,
    pub uploads_failed: usize,
    pub cancelled: bool,
}
