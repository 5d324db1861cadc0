use std::sync::Arc;
use std::time::Duration;

use kbcrawl_core::error::CrawlError;
use kbcrawl_core::models::{NavigationPolicy, Selector};
use kbcrawl_core::traits::{RenderedPage, Renderer};
use reqwest::Client;
use reqwest::header::COOKIE;
use scraper::Html;
use url::Url;

use crate::fetcher::{build_client, transport_error};
use crate::xpath::xpath_to_css;

/// Renderer for server-rendered sites: one HTTP GET, no JavaScript.
///
/// Cookies from the navigation policy are sent in the `Cookie` header of the
/// document request. There are no subresource requests to block, but a seed
/// or link that itself has a blocked extension is refused.
#[derive(Clone)]
pub struct StaticRenderer {
    client: Client,
    timeout: Duration,
}

impl StaticRenderer {
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

impl Renderer for StaticRenderer {
    type Page = StaticPage;

    async fn render(&self, url: &str, policy: &NavigationPolicy) -> Result<StaticPage, CrawlError> {
        if policy.blocks(url) {
            return Err(CrawlError::FetchError(format!(
                "{url} has an excluded resource type"
            )));
        }

        let mut request = self.client.get(url);
        if !policy.cookies.is_empty() {
            let header = policy
                .cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; ");
            request = request.header(COOKIE, header);
        }

        let response = request
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

        let final_url = response.url().to_string();
        let html = response
            .text()
            .await
            .map_err(|e| CrawlError::FetchError(format!("Failed to read response body: {e}")))?;

        tracing::debug!(url = %final_url, bytes = html.len(), "Fetched page");
        Ok(StaticPage::new(final_url, html))
    }
}

/// A fetched HTML document.
///
/// The source is re-parsed on each query; `scraper::Html` is not `Send`.
#[derive(Debug, Clone)]
pub struct StaticPage {
    url: String,
    html: Arc<str>,
}

impl StaticPage {
    pub fn new(url: impl Into<String>, html: impl Into<Arc<str>>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }
}

impl RenderedPage for StaticPage {
    fn url(&self) -> &str {
        &self.url
    }

    async fn title(&self) -> Result<String, CrawlError> {
        Ok(document_title(&self.html))
    }

    async fn inner_html(&self, selector: &Selector) -> Result<Option<String>, CrawlError> {
        let css = match selector {
            Selector::Css(css) => css.clone(),
            Selector::XPath(xpath) => xpath_to_css(xpath)?,
        };
        select_inner_html(&self.html, &css)
    }

    async fn links(&self) -> Result<Vec<String>, CrawlError> {
        Ok(document_links(&self.html, &self.url))
    }

    async fn close(self) {}
}

fn parse_selector(css: &str) -> Result<scraper::Selector, CrawlError> {
    scraper::Selector::parse(css)
        .map_err(|e| CrawlError::RendererError(format!("invalid selector '{css}': {e}")))
}

fn document_title(html: &str) -> String {
    let doc = Html::parse_document(html);
    let Ok(selector) = scraper::Selector::parse("title") else {
        return String::new();
    };
    doc.select(&selector)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn select_inner_html(html: &str, css: &str) -> Result<Option<String>, CrawlError> {
    let selector = parse_selector(css)?;
    let doc = Html::parse_document(html);
    Ok(doc.select(&selector).next().map(|el| el.inner_html()))
}

/// Absolute targets of every `<a href>`, resolved against `<base href>` when
/// present and the page URL otherwise.
fn document_links(html: &str, page_url: &str) -> Vec<String> {
    let Ok(page) = Url::parse(page_url) else {
        return Vec::new();
    };
    let doc = Html::parse_document(html);

    let base = scraper::Selector::parse("base[href]")
        .ok()
        .and_then(|s| doc.select(&s).next().and_then(|b| b.value().attr("href")))
        .and_then(|href| page.join(href).ok())
        .unwrap_or(page);

    let Ok(anchors) = scraper::Selector::parse("a[href]") else {
        return Vec::new();
    };
    doc.select(&anchors)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .map(String::from)
        .collect()
}
