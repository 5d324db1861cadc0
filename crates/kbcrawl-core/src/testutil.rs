//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests. Shared state
//! lives behind `Arc` so clones handed to the crawler report back to the
//! test that created them.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::crawler::{CrawlEvent, CrawlReporter};
use crate::error::CrawlError;
use crate::models::{NavigationPolicy, Selector, UploadReceipt, UploadTask};
use crate::traits::{Cleaner, Dataset, Fetcher, PageHook, RenderedPage, Renderer, Uploader};

// ---------------------------------------------------------------------------
// Gauge
// ---------------------------------------------------------------------------

/// Tracks how many operations are running and the highest count seen.
#[derive(Debug, Default)]
pub struct Gauge {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl Gauge {
    pub fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// A gauge slot released on drop unless ownership moves elsewhere.
struct GaugeSlot(Option<Arc<Gauge>>);

impl GaugeSlot {
    fn enter(gauge: &Arc<Gauge>) -> Self {
        gauge.enter();
        Self(Some(Arc::clone(gauge)))
    }

    fn hand_over(mut self) -> Arc<Gauge> {
        self.0.take().unwrap()
    }
}

impl Drop for GaugeSlot {
    fn drop(&mut self) {
        if let Some(gauge) = self.0.take() {
            gauge.exit();
        }
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher with per-URL responses, a response queue and a default body.
///
/// Lookup order: per-URL response (used once), then the queue, then the
/// default body. With none of those a `FetchError` is returned.
#[derive(Clone, Default)]
pub struct MockFetcher {
    by_url: Arc<Mutex<HashMap<String, Result<String, CrawlError>>>>,
    queue: Arc<Mutex<VecDeque<Result<String, CrawlError>>>>,
    default_body: Option<String>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    /// Returns `body` for every URL.
    pub fn new(body: &str) -> Self {
        Self {
            default_body: Some(body.to_string()),
            ..Default::default()
        }
    }

    /// Fails the first fetch with `error`.
    pub fn with_error(error: CrawlError) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::from([Err(error)]))),
            ..Default::default()
        }
    }

    pub fn by_url<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = (S, Result<String, CrawlError>)>,
        S: Into<String>,
    {
        Self {
            by_url: Arc::new(Mutex::new(
                responses.into_iter().map(|(u, r)| (u.into(), r)).collect(),
            )),
            ..Default::default()
        }
    }

    /// Every URL fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, CrawlError> {
        self.calls.lock().unwrap().push(url.to_string());
        if let Some(response) = self.by_url.lock().unwrap().remove(url) {
            return response;
        }
        if let Some(response) = self.queue.lock().unwrap().pop_front() {
            return response;
        }
        match &self.default_body {
            Some(body) => Ok(body.clone()),
            None => Err(CrawlError::FetchError(format!("HTTP 404 for {url}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// MockCleaner
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MockCleaner {
    error: Arc<Mutex<Option<CrawlError>>>,
    calls: Arc<AtomicUsize>,
}

impl MockCleaner {
    /// Creates a cleaner that returns the input unchanged.
    pub fn passthrough() -> Self {
        Self {
            error: Arc::new(Mutex::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates a cleaner whose first call fails with `error`.
    pub fn with_error(error: CrawlError) -> Self {
        Self {
            error: Arc::new(Mutex::new(Some(error))),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Cleaner for MockCleaner {
    fn clean(&self, html: &str) -> Result<String, CrawlError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.error.lock().unwrap().take() {
            return Err(e);
        }
        Ok(html.to_string())
    }
}

// ---------------------------------------------------------------------------
// MockPage
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Region {
    html: String,
    /// Probes that report "no match" before the region appears.
    misses: usize,
}

/// A rendered page with fixed regions and links.
#[derive(Clone)]
pub struct MockPage {
    url: String,
    title: String,
    regions: HashMap<String, Region>,
    links: Vec<String>,
    probes: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    gauge: Option<Arc<Gauge>>,
}

impl MockPage {
    pub fn new(url: &str, title: &str) -> Self {
        Self {
            url: url.to_string(),
            title: title.to_string(),
            regions: HashMap::new(),
            links: Vec::new(),
            probes: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
            gauge: None,
        }
    }

    /// Content matched by `selector` from the first probe on.
    pub fn with_region(self, selector: &str, html: &str) -> Self {
        self.with_late_region(selector, html, 0)
    }

    /// Content matched by `selector` only after `misses` empty probes.
    pub fn with_late_region(mut self, selector: &str, html: &str, misses: usize) -> Self {
        self.regions.insert(
            selector.to_string(),
            Region {
                html: html.to_string(),
                misses,
            },
        );
        self
    }

    pub fn with_links<I, S>(mut self, links: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.links.extend(links.into_iter().map(Into::into));
        self
    }

    /// Number of selector probes made against this page (and its clones).
    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Number of times this page (or a clone) was closed.
    pub fn closes(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl RenderedPage for MockPage {
    fn url(&self) -> &str {
        &self.url
    }

    async fn title(&self) -> Result<String, CrawlError> {
        Ok(self.title.clone())
    }

    async fn inner_html(&self, selector: &Selector) -> Result<Option<String>, CrawlError> {
        let probe = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(self
            .regions
            .get(selector.as_str())
            .filter(|region| probe > region.misses)
            .map(|region| region.html.clone()))
    }

    async fn links(&self) -> Result<Vec<String>, CrawlError> {
        Ok(self.links.clone())
    }

    async fn close(self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
        if let Some(gauge) = &self.gauge {
            gauge.exit();
        }
    }
}

// ---------------------------------------------------------------------------
// MockRenderer
// ---------------------------------------------------------------------------

/// Mock renderer serving a fixed set of pages.
///
/// Unknown URLs fail with `FetchError`. A page counts as open from the
/// start of `render` until it is closed, or until a failed or abandoned
/// `render` returns; `max_open` reports the peak.
#[derive(Clone, Default)]
pub struct MockRenderer {
    pages: Arc<Mutex<HashMap<String, MockPage>>>,
    failures: Arc<Mutex<HashMap<String, CrawlError>>>,
    rendered: Arc<Mutex<Vec<String>>>,
    policies: Arc<Mutex<Vec<NavigationPolicy>>>,
    delay: Option<Duration>,
    gauge: Arc<Gauge>,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `page` at its own URL.
    pub fn with_page(self, page: MockPage) -> Self {
        self.pages.lock().unwrap().insert(page.url.clone(), page);
        self
    }

    /// Serve `page` when `url` is rendered, as if `url` redirected to the
    /// page's own URL.
    pub fn with_redirect(self, url: &str, page: MockPage) -> Self {
        self.pages.lock().unwrap().insert(url.to_string(), page);
        self
    }

    /// Fail the render of `url` with `error`.
    pub fn with_failure(self, url: &str, error: CrawlError) -> Self {
        self.failures.lock().unwrap().insert(url.to_string(), error);
        self
    }

    /// Sleep this long inside every render.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// URLs passed to `render`, in call order.
    pub fn rendered_urls(&self) -> Vec<String> {
        self.rendered.lock().unwrap().clone()
    }

    pub fn render_count(&self) -> usize {
        self.rendered.lock().unwrap().len()
    }

    /// Navigation policies received, one per render.
    pub fn policies(&self) -> Vec<NavigationPolicy> {
        self.policies.lock().unwrap().clone()
    }

    pub fn max_open(&self) -> usize {
        self.gauge.max()
    }

    pub fn open_pages(&self) -> usize {
        self.gauge.current()
    }
}

impl Renderer for MockRenderer {
    type Page = MockPage;

    async fn render(&self, url: &str, policy: &NavigationPolicy) -> Result<MockPage, CrawlError> {
        self.rendered.lock().unwrap().push(url.to_string());
        self.policies.lock().unwrap().push(policy.clone());
        let slot = GaugeSlot::enter(&self.gauge);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.lock().unwrap().remove(url);
        if let Some(error) = failure {
            return Err(error);
        }

        let page = self.pages.lock().unwrap().get(url).cloned();
        match page {
            Some(mut page) => {
                page.gauge = Some(slot.hand_over());
                Ok(page)
            }
            None => Err(CrawlError::FetchError(format!("HTTP 404 for {url}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// MockUploader
// ---------------------------------------------------------------------------

/// Mock uploader that records delivered documents.
#[derive(Clone, Default)]
pub struct MockUploader {
    failing: Arc<HashSet<String>>,
    error: Arc<Mutex<Option<CrawlError>>>,
    delay: Option<Duration>,
    uploaded: Arc<Mutex<Vec<UploadTask>>>,
    attempts: Arc<AtomicUsize>,
    gauge: Arc<Gauge>,
}

impl MockUploader {
    /// Accepts every document.
    pub fn ok() -> Self {
        Self::default()
    }

    /// Rejects documents with these filenames, accepts the rest.
    pub fn failing_for<I, S>(filenames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            failing: Arc::new(filenames.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Fails the first upload with `error`.
    pub fn with_error(error: CrawlError) -> Self {
        Self {
            error: Arc::new(Mutex::new(Some(error))),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Documents accepted so far.
    pub fn uploads(&self) -> Vec<UploadTask> {
        self.uploaded.lock().unwrap().clone()
    }

    pub fn uploaded_filenames(&self) -> Vec<String> {
        self.uploads().into_iter().map(|t| t.filename).collect()
    }

    /// Upload calls made, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.gauge.max()
    }
}

impl Uploader for MockUploader {
    async fn upload(&self, task: &UploadTask) -> Result<UploadReceipt, CrawlError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.gauge.enter();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.gauge.exit();

        if let Some(e) = self.error.lock().unwrap().take() {
            return Err(e);
        }
        if self.failing.contains(&task.filename) {
            return Err(CrawlError::UploadRejected {
                status: 500,
                body: "internal error".into(),
            });
        }

        self.uploaded.lock().unwrap().push(task.clone());
        Ok(UploadReceipt {
            http_status: 200,
            status_type: Some("PENDING".into()),
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryDataset
// ---------------------------------------------------------------------------

/// In-memory dataset that keeps every pushed record.
#[derive(Clone, Default)]
pub struct MemoryDataset {
    records: Arc<Mutex<Vec<serde_json::Value>>>,
    fail: bool,
}

impl MemoryDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dataset whose every push fails with `StorageError`.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn records(&self) -> Vec<serde_json::Value> {
        self.records.lock().unwrap().clone()
    }
}

impl Dataset for MemoryDataset {
    async fn push(&self, record: &serde_json::Value) -> Result<(), CrawlError> {
        if self.fail {
            return Err(CrawlError::StorageError("disk full".into()));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Hook that records visited URLs and pushes a marker record to the sink.
#[derive(Clone, Default)]
pub struct RecordingHook {
    visited: Arc<Mutex<Vec<String>>>,
}

impl RecordingHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }
}

impl<P: RenderedPage> PageHook<P> for RecordingHook {
    async fn on_visit_page<D: Dataset>(&self, page: &P, sink: &D) -> Result<(), CrawlError> {
        self.visited.lock().unwrap().push(page.url().to_string());
        sink.push(&serde_json::json!({ "hook": page.url() })).await
    }
}

/// Hook that always fails.
#[derive(Clone, Default)]
pub struct FailingHook;

impl<P: RenderedPage> PageHook<P> for FailingHook {
    async fn on_visit_page<D: Dataset>(&self, _page: &P, _sink: &D) -> Result<(), CrawlError> {
        Err(CrawlError::HookError("hook exploded".into()))
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock crawl reporter that records event labels.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, label: &str) -> usize {
        self.events.lock().unwrap().iter().filter(|e| *e == label).count()
    }
}

impl CrawlReporter for MockReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        let label = match &event {
            CrawlEvent::PhaseChanged { phase } => format!("Phase:{phase}"),
            CrawlEvent::Seeded { .. } => "Seeded".to_string(),
            CrawlEvent::PageDispatched { .. } => "PageDispatched".to_string(),
            CrawlEvent::PageCompleted { .. } => "PageCompleted".to_string(),
            CrawlEvent::PageFailed { .. } => "PageFailed".to_string(),
            CrawlEvent::PageSkipped { .. } => "PageSkipped".to_string(),
            CrawlEvent::BudgetExhausted { .. } => "BudgetExhausted".to_string(),
            CrawlEvent::Cancelled => "Cancelled".to_string(),
            CrawlEvent::Finished { .. } => "Finished".to_string(),
        };
        self.events.lock().unwrap().push(label);
    }
}
