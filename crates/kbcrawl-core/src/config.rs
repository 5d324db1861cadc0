use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::error::CrawlError;
use crate::matcher::UrlMatcher;
use crate::models::{Cookie, NavigationPolicy, Selector};

pub const DEFAULT_MAX_PAGES: usize = 50;
pub const DEFAULT_SELECTOR_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 2;
pub const DEFAULT_API_BASE_URL: &str = "https://api.voiceflow.com";
pub const DEFAULT_OUTPUT_PATH: &str = "storage/datasets/default.jsonl";

/// Immutable configuration for one crawl run.
///
/// Deserializes from the external JSON shape, where `match`, `exclude` and
/// `cookie` accept either a single value or a list. Required fields default
/// to empty so that [`CrawlConfig::validate`] can report all of them at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlConfig {
    /// Seed URL, or a sitemap URL.
    #[serde(default)]
    pub url: String,

    /// Glob patterns a discovered link must match (at least one).
    #[serde(rename = "match", default, deserialize_with = "one_or_many")]
    pub match_patterns: Vec<String>,

    /// Glob patterns a discovered link must not match.
    #[serde(default, deserialize_with = "one_or_many")]
    pub exclude: Vec<String>,

    /// CSS selector, or XPath when it starts with `/`.
    #[serde(default)]
    pub selector: String,

    #[serde(default = "default_max_pages")]
    pub max_pages_to_crawl: usize,

    /// Milliseconds to wait for the selector to appear.
    #[serde(default = "default_selector_timeout")]
    pub wait_for_selector_timeout: u64,

    /// File extensions whose requests are aborted before download.
    #[serde(default)]
    pub resource_exclusions: Vec<String>,

    #[serde(default, deserialize_with = "one_or_many")]
    pub cookie: Vec<Cookie>,

    #[serde(rename = "VFAPIKey", alias = "apiKey", default)]
    pub api_key: String,

    #[serde(rename = "projectID", alias = "projectId", default)]
    pub project_id: String,

    /// Pages rendered in parallel.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Uploads in flight at once, independent of page concurrency.
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,

    /// Milliseconds allowed for a single page load.
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout: u64,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// JSON Lines file receiving the page results.
    #[serde(default = "default_output_path")]
    pub output_path: String,
}

fn default_max_pages() -> usize {
    DEFAULT_MAX_PAGES
}

fn default_selector_timeout() -> u64 {
    DEFAULT_SELECTOR_TIMEOUT_MS
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_upload_concurrency() -> usize {
    DEFAULT_UPLOAD_CONCURRENCY
}

fn default_navigation_timeout() -> u64 {
    DEFAULT_NAVIGATION_TIMEOUT_MS
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_output_path() -> String {
    DEFAULT_OUTPUT_PATH.to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
    })
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            match_patterns: Vec::new(),
            exclude: Vec::new(),
            selector: String::new(),
            max_pages_to_crawl: DEFAULT_MAX_PAGES,
            wait_for_selector_timeout: DEFAULT_SELECTOR_TIMEOUT_MS,
            resource_exclusions: Vec::new(),
            cookie: Vec::new(),
            api_key: String::new(),
            project_id: String::new(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT_MS,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            output_path: DEFAULT_OUTPUT_PATH.to_string(),
        }
    }
}

impl CrawlConfig {
    /// Parse a config from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, CrawlError> {
        serde_json::from_str(json)
            .map_err(|e| CrawlError::ConfigValidation(format!("malformed config: {e}")))
    }

    /// Check that the config can drive a crawl.
    ///
    /// Reports every missing required field in one error, then checks the
    /// seed URL, the numeric limits and the glob patterns.
    pub fn validate(&self) -> Result<(), CrawlError> {
        let mut missing = Vec::new();
        if self.url.trim().is_empty() {
            missing.push("url");
        }
        if self.match_patterns.iter().all(|p| p.trim().is_empty()) {
            missing.push("match");
        }
        if self.selector.trim().is_empty() {
            missing.push("selector");
        }
        if self.api_key.trim().is_empty() {
            missing.push("VFAPIKey");
        }
        if self.project_id.trim().is_empty() {
            missing.push("projectID");
        }
        if !missing.is_empty() {
            return Err(CrawlError::ConfigValidation(format!(
                "missing required field(s): {}",
                missing.join(", ")
            )));
        }

        let seed = Url::parse(&self.url).map_err(|e| {
            CrawlError::ConfigValidation(format!("url '{}' is not a valid URL: {e}", self.url))
        })?;
        if !matches!(seed.scheme(), "http" | "https") {
            return Err(CrawlError::ConfigValidation(format!(
                "url scheme '{}' is not supported (only http/https)",
                seed.scheme()
            )));
        }

        if self.max_pages_to_crawl == 0 {
            return Err(CrawlError::ConfigValidation(
                "maxPagesToCrawl must be a positive integer".into(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(CrawlError::ConfigValidation(
                "maxConcurrency must be a positive integer".into(),
            ));
        }
        if self.upload_concurrency == 0 {
            return Err(CrawlError::ConfigValidation(
                "uploadConcurrency must be a positive integer".into(),
            ));
        }
        if self.cookie.iter().any(|c| c.name.trim().is_empty()) {
            return Err(CrawlError::ConfigValidation(
                "cookie name must not be empty".into(),
            ));
        }

        UrlMatcher::new(&self.match_patterns, &self.exclude)?;
        Ok(())
    }

    pub fn selector(&self) -> Selector {
        Selector::parse(self.selector.trim())
    }

    pub fn navigation_policy(&self) -> NavigationPolicy {
        NavigationPolicy::new(self.cookie.clone(), &self.resource_exclusions)
    }

    pub fn selector_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_for_selector_timeout)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout)
    }

    /// Copy with the API key masked, for logging and dry runs.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.api_key.is_empty() {
            copy.api_key = "<redacted>".into();
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> CrawlConfig {
        CrawlConfig {
            url: "https://example.com/docs".into(),
            match_patterns: vec!["https://example.com/docs/**".into()],
            selector: "main".into(),
            api_key: "VF.DM.key".into(),
            project_id: "project".into(),
            ..CrawlConfig::default()
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn missing_fields_are_all_reported() {
        let err = CrawlConfig::default().validate().unwrap_err();
        assert!(err.is_fatal());
        let msg = err.to_string();
        for field in ["url", "match", "selector", "VFAPIKey", "projectID"] {
            assert!(msg.contains(field), "{field} not reported in: {msg}");
        }
    }

    #[test]
    fn each_required_field_is_enforced() {
        for field in ["url", "match", "selector", "VFAPIKey", "projectID"] {
            let mut config = valid();
            match field {
                "url" => config.url.clear(),
                "match" => config.match_patterns = vec!["  ".into()],
                "selector" => config.selector = "   ".into(),
                "VFAPIKey" => config.api_key.clear(),
                _ => config.project_id.clear(),
            }
            let err = config.validate().unwrap_err();
            assert!(matches!(err, CrawlError::ConfigValidation(_)));
            assert!(err.to_string().contains(field));
        }
    }

    #[test]
    fn rejects_non_http_seed_and_zero_budget() {
        let mut config = valid();
        config.url = "ftp://example.com/".into();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.max_pages_to_crawl = 0;
        assert!(config.validate().unwrap_err().to_string().contains("maxPagesToCrawl"));
    }

    #[test]
    fn rejects_bad_glob() {
        let mut config = valid();
        config.exclude = vec!["https://example.com/{a,b".into()];
        assert!(matches!(
            config.validate(),
            Err(CrawlError::ConfigValidation(_))
        ));
    }

    #[test]
    fn deserializes_external_field_names() {
        let json = r#"{
            "url": "https://developer.example.com/docs/get-started",
            "match": "https://developer.example.com/docs/**",
            "selector": "//*[@id=\"content-container\"]/section[1]/div[1]",
            "exclude": [],
            "maxPagesToCrawl": 300,
            "waitForSelectorTimeout": 10000,
            "cookie": {"name": "session", "value": "abc"},
            "VFAPIKey": "VF.DM.XX",
            "projectID": "XXX"
        }"#;
        let config = CrawlConfig::from_json(json).unwrap();
        assert_eq!(config.match_patterns, vec!["https://developer.example.com/docs/**"]);
        assert!(config.exclude.is_empty());
        assert_eq!(config.max_pages_to_crawl, 300);
        assert_eq!(config.selector_timeout(), Duration::from_secs(10));
        assert_eq!(config.cookie, vec![Cookie::new("session", "abc")]);
        assert_eq!(config.api_key, "VF.DM.XX");
        assert_eq!(config.project_id, "XXX");
        assert!(config.selector().is_xpath());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn defaults_apply_when_fields_absent() {
        let config = CrawlConfig::from_json(r#"{"url": "https://example.com"}"#).unwrap();
        assert_eq!(config.max_pages_to_crawl, DEFAULT_MAX_PAGES);
        assert_eq!(config.wait_for_selector_timeout, 1000);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert!(config.cookie.is_empty());
    }

    #[test]
    fn list_forms_are_accepted() {
        let json = r#"{
            "match": ["https://a.test/**", "https://b.test/**"],
            "exclude": "**/archive/**",
            "cookie": [{"name": "a", "value": "1"}, {"name": "b", "value": "2"}],
            "resourceExclusions": ["png", "css"]
        }"#;
        let config = CrawlConfig::from_json(json).unwrap();
        assert_eq!(config.match_patterns.len(), 2);
        assert_eq!(config.exclude, vec!["**/archive/**"]);
        assert_eq!(config.cookie.len(), 2);
        assert_eq!(config.navigation_policy().blocked_extensions, vec!["png", "css"]);
    }

    #[test]
    fn malformed_json_is_a_validation_error() {
        let err = CrawlConfig::from_json("{not json").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn redacted_masks_api_key() {
        let config = valid().redacted();
        assert_eq!(config.api_key, "<redacted>");
        assert_eq!(config.project_id, "project");
    }
}
