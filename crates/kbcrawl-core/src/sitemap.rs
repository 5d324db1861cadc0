//! Sitemap parsing (`<urlset>` and `<sitemapindex>`) and resolution.

use std::collections::{HashSet, VecDeque};

use serde::Deserialize;

use crate::error::CrawlError;
use crate::traits::Fetcher;

/// How many levels of nested sitemap indexes are followed.
pub const MAX_SITEMAP_DEPTH: usize = 3;

#[derive(Debug, Default, Deserialize)]
struct SitemapDocument {
    #[serde(rename = "url", default)]
    urls: Vec<Location>,
    #[serde(rename = "sitemap", default)]
    sitemaps: Vec<Location>,
}

#[derive(Debug, Deserialize)]
struct Location {
    #[serde(default)]
    loc: String,
}

/// Contents of one sitemap document.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedSitemap {
    /// Page URLs from `<urlset>` entries.
    pub pages: Vec<String>,
    /// Child sitemap URLs from `<sitemapindex>` entries.
    pub sitemaps: Vec<String>,
}

pub fn parse_sitemap(xml: &str) -> Result<ParsedSitemap, CrawlError> {
    let doc: SitemapDocument =
        quick_xml::de::from_str(xml).map_err(|e| CrawlError::SitemapError(e.to_string()))?;

    let collect = |locations: Vec<Location>| {
        locations
            .into_iter()
            .map(|l| l.loc.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
    };

    Ok(ParsedSitemap {
        pages: collect(doc.urls),
        sitemaps: collect(doc.sitemaps),
    })
}

/// Fetch a sitemap and return every page URL it lists, following nested
/// sitemap indexes up to [`MAX_SITEMAP_DEPTH`].
///
/// Page URLs keep document order with duplicates removed. Failing to load
/// the root sitemap is an error; a failing child sitemap is logged and
/// skipped.
pub async fn resolve_sitemap<F: Fetcher>(fetcher: &F, url: &str) -> Result<Vec<String>, CrawlError> {
    let mut pending = VecDeque::from([(url.to_string(), 0usize)]);
    let mut visited = HashSet::new();
    let mut seen_pages = HashSet::new();
    let mut pages = Vec::new();

    while let Some((sitemap_url, depth)) = pending.pop_front() {
        if !visited.insert(sitemap_url.clone()) {
            continue;
        }

        let parsed = match fetcher.fetch(&sitemap_url).await.and_then(|xml| parse_sitemap(&xml)) {
            Ok(parsed) => parsed,
            Err(e) if depth == 0 => return Err(e),
            Err(e) => {
                tracing::warn!(url = %sitemap_url, error = %e, "Skipping unreadable child sitemap");
                continue;
            }
        };

        tracing::debug!(
            url = %sitemap_url,
            pages = parsed.pages.len(),
            children = parsed.sitemaps.len(),
            "Parsed sitemap"
        );

        for page in parsed.pages {
            if seen_pages.insert(page.clone()) {
                pages.push(page);
            }
        }

        if depth < MAX_SITEMAP_DEPTH {
            pending.extend(parsed.sitemaps.into_iter().map(|child| (child, depth + 1)));
        } else if !parsed.sitemaps.is_empty() {
            tracing::warn!(url = %sitemap_url, "Sitemap index nesting too deep, ignoring children");
        }
    }

    Ok(pages)
}
