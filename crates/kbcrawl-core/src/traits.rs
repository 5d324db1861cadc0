use std::future::Future;

use crate::error::CrawlError;
use crate::models::{NavigationPolicy, Selector, UploadReceipt, UploadTask};

/// Fetches a raw text resource (sitemaps) without rendering it.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, CrawlError>> + Send;
}

/// Converts extracted HTML into normalized text.
pub trait Cleaner: Send + Sync + Clone {
    fn clean(&self, html: &str) -> Result<String, CrawlError>;
}

/// Produces a live, rendered page for a URL.
///
/// The navigation policy (cookies, blocked resource types) must be in
/// place before the first request for the document is sent. The crawler
/// drops the `render` future when the navigation timeout fires, so anything
/// it opened must be released on drop.
pub trait Renderer: Send + Sync + Clone + 'static {
    type Page: RenderedPage;

    fn render(
        &self,
        url: &str,
        policy: &NavigationPolicy,
    ) -> impl Future<Output = Result<Self::Page, CrawlError>> + Send;
}

/// Handle to a rendered document.
pub trait RenderedPage: Send + Sync + 'static {
    /// The URL the page ended up at, after redirects.
    fn url(&self) -> &str;

    fn title(&self) -> impl Future<Output = Result<String, CrawlError>> + Send;

    /// Inner HTML of the first node matching `selector`, or `None` when no
    /// node matches yet.
    fn inner_html(
        &self,
        selector: &Selector,
    ) -> impl Future<Output = Result<Option<String>, CrawlError>> + Send;

    /// Absolute targets of every link on the page.
    fn links(&self) -> impl Future<Output = Result<Vec<String>, CrawlError>> + Send;

    /// Release the page's renderer resources.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Delivers one document to the knowledge base.
pub trait Uploader: Send + Sync + Clone + 'static {
    fn upload(
        &self,
        task: &UploadTask,
    ) -> impl Future<Output = Result<UploadReceipt, CrawlError>> + Send;
}

/// Durable local sink for crawl output records.
pub trait Dataset: Send + Sync + Clone + 'static {
    fn push(&self, record: &serde_json::Value)
    -> impl Future<Output = Result<(), CrawlError>> + Send;
}

/// Caller-supplied side effects run on every successfully extracted page.
///
/// Runs after extraction and before link discovery. Errors are logged and
/// never affect the page's result or upload.
pub trait PageHook<P: RenderedPage>: Send + Sync + 'static {
    fn on_visit_page<D: Dataset>(
        &self,
        page: &P,
        sink: &D,
    ) -> impl Future<Output = Result<(), CrawlError>> + Send;
}

/// The default hook: does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl<P: RenderedPage> PageHook<P> for NoopHook {
    async fn on_visit_page<D: Dataset>(&self, _page: &P, _sink: &D) -> Result<(), CrawlError> {
        Ok(())
    }
}

/// A Dataset that discards records, for runs that need no local output.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDataset;

impl Dataset for NullDataset {
    async fn push(&self, _record: &serde_json::Value) -> Result<(), CrawlError> {
        Ok(())
    }
}
