use std::sync::{Arc, LazyLock};

use htmd::HtmlToMarkdown;
use kbcrawl_core::error::CrawlError;
use kbcrawl_core::traits::Cleaner;
use regex::Regex;

/// Elements removed together with their content.
pub const DROPPED_TAGS: &[&str] = &[
    "style", "head", "script", "meta", "form", "svg", "noscript", "footer", "button",
];

/// Elements rendered as plain paragraphs.
pub const PARAGRAPH_ALIASES: &[&str] = &["figure", "figcaption", "dl", "dd", "dt"];

static ALIAS_TAG: LazyLock<Regex> = LazyLock::new(|| {
    let names = PARAGRAPH_ALIASES.join("|");
    Regex::new(&format!(r"(?i)<(/?)(?:{names})\b")).expect("valid alias regex")
});

/// HTML-to-Markdown cleaner using htmd.
///
/// Layout wrappers (`div`, `section`, `main`, `nav`, ...) have no Markdown
/// form and are unwrapped to their children; unknown tags fall back to the
/// default conversion.
pub struct HtmdCleaner {
    converter: Arc<HtmlToMarkdown>,
}

impl Clone for HtmdCleaner {
    fn clone(&self) -> Self {
        Self {
            converter: Arc::clone(&self.converter),
        }
    }
}

impl HtmdCleaner {
    pub fn new() -> Self {
        let converter = HtmlToMarkdown::builder()
            .skip_tags(DROPPED_TAGS.to_vec())
            .build();

        Self {
            converter: Arc::new(converter),
        }
    }
}

impl Default for HtmdCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl Cleaner for HtmdCleaner {
    fn clean(&self, html: &str) -> Result<String, CrawlError> {
        let aliased = ALIAS_TAG.replace_all(html, "<${1}p");
        self.converter
            .convert(&aliased)
            .map(|text| text.trim().to_string())
            .map_err(|e| CrawlError::CleanerError(e.to_string()))
    }
}
