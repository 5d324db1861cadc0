use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::fetch::{
    EnableParams, EventRequestPaused, FailRequestParams, RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, ErrorReason};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use kbcrawl_core::error::CrawlError;
use kbcrawl_core::models::{NavigationPolicy, Selector};
use kbcrawl_core::traits::{RenderedPage, Renderer};
use tokio::task::JoinHandle;

const INNER_HTML_JS: &str = r#"(() => {
  const selector = __SELECTOR__;
  const el = __XPATH__
    ? document.evaluate(selector, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue
    : document.querySelector(selector);
  return el ? el.innerHTML : null;
})()"#;

const LINKS_JS: &str = "Array.from(document.querySelectorAll('a[href]'), a => a.href)";

/// Headless-browser renderer using Chromium via the Chrome DevTools Protocol.
///
/// A single Chromium process is shared across all clones; every render opens
/// a tab on `about:blank`, installs the navigation policy, then navigates.
/// Requests for blocked resource types are failed with `BlockedByClient`
/// through the `Fetch` domain.
#[derive(Clone)]
pub struct BrowserRenderer {
    browser: Arc<Browser>,
}

impl BrowserRenderer {
    /// Launches a headless Chromium browser with a **30 s** request timeout.
    ///
    /// Requires a Chromium / Chrome binary reachable via `$PATH` (or the
    /// default locations checked by `chromiumoxide`).
    pub async fn new() -> Result<Self, CrawlError> {
        Self::with_timeout(Duration::from_secs(30)).await
    }

    pub async fn with_timeout(timeout: Duration) -> Result<Self, CrawlError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .disable_default_args()
            .request_timeout(timeout);

        if let Some(bin) = Self::find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .build()
            .map_err(|e| CrawlError::RendererError(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| CrawlError::RendererError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
        })
    }

    /// Locate a Chrome/Chromium binary, honouring `CHROME_BIN`.
    ///
    /// The snap wrapper at `/snap/bin/chromium` strips unknown CLI flags, so
    /// the real binary inside the snap is preferred. `None` lets
    /// `chromiumoxide` do its own lookup.
    fn find_chrome_binary() -> Option<PathBuf> {
        if let Ok(p) = std::env::var("CHROME_BIN") {
            let path = PathBuf::from(&p);
            if path.exists() {
                return Some(path);
            }
        }

        [
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
    }

    /// Install cookies and request blocking on a blank tab. The task that
    /// aborts intercepted requests is owned by `tab` as soon as it exists.
    async fn prepare(
        &self,
        tab: &mut BrowserPage,
        url: &str,
        policy: &NavigationPolicy,
    ) -> Result<(), CrawlError> {
        let page = &tab.page;
        if !policy.cookies.is_empty() {
            let cookies = policy
                .cookies
                .iter()
                .map(|c| {
                    CookieParam::builder()
                        .name(c.name.clone())
                        .value(c.value.clone())
                        .url(url)
                        .build()
                        .map_err(|e| CrawlError::RendererError(format!("Invalid cookie '{}': {e}", c.name)))
                })
                .collect::<Result<Vec<_>, _>>()?;
            page.set_cookies(cookies)
                .await
                .map_err(|e| CrawlError::RendererError(format!("Failed to set cookies: {e}")))?;
        }

        let patterns = policy.request_patterns();
        if patterns.is_empty() {
            return Ok(());
        }

        let mut paused = page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(|e| CrawlError::RendererError(format!("Failed to intercept requests: {e}")))?;

        let enable = EnableParams {
            patterns: Some(
                patterns
                    .into_iter()
                    .map(|p| RequestPattern {
                        url_pattern: Some(p),
                        resource_type: None,
                        request_stage: Some(RequestStage::Request),
                    })
                    .collect(),
            ),
            handle_auth_requests: None,
        };
        page.execute(enable)
            .await
            .map_err(|e| CrawlError::RendererError(format!("Failed to enable request blocking: {e}")))?;

        let interceptor = page.clone();
        tab.interceptor = Some(AbortOnDrop(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                tracing::debug!(url = %event.request.url, "Blocking excluded resource");
                let fail = FailRequestParams::new(event.request_id.clone(), ErrorReason::BlockedByClient);
                if let Err(e) = interceptor.execute(fail).await {
                    tracing::debug!(error = %e, "Failed to abort request");
                }
            }
        })));
        Ok(())
    }
}

impl Renderer for BrowserRenderer {
    type Page = BrowserPage;

    async fn render(&self, url: &str, policy: &NavigationPolicy) -> Result<BrowserPage, CrawlError> {
        if policy.blocks(url) {
            return Err(CrawlError::FetchError(format!(
                "{url} has an excluded resource type"
            )));
        }

        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| CrawlError::RendererError(format!("Failed to open tab: {e}")))?;

        // From here on the tab closes itself if this future is dropped or
        // returns early.
        let mut tab = BrowserPage {
            page,
            url: url.to_string(),
            interceptor: None,
            closed: false,
        };
        self.prepare(&mut tab, url, policy).await?;
        tab.page
            .goto(url)
            .await
            .map_err(|e| CrawlError::FetchError(format!("Failed to navigate to {url}: {e}")))?;
        if let Some(final_url) = tab.page.url().await.ok().flatten() {
            tab.url = final_url;
        }
        Ok(tab)
    }
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// An open browser tab.
///
/// Dropping a tab that was never closed aborts its request interceptor and
/// closes the target in the background.
pub struct BrowserPage {
    page: Page,
    url: String,
    interceptor: Option<AbortOnDrop>,
    closed: bool,
}

impl Drop for BrowserPage {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.interceptor = None;
        let page = self.page.clone();
        let url = std::mem::take(&mut self.url);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = page.close().await {
                        tracing::debug!(%url, error = %e, "Failed to close abandoned tab");
                    }
                });
            }
            Err(_) => tracing::warn!(%url, "No runtime to close abandoned tab"),
        }
    }
}

impl BrowserPage {
    async fn evaluate_json(&self, script: String) -> Result<serde_json::Value, CrawlError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| CrawlError::RendererError(format!("Script evaluation failed: {e}")))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }
}

impl RenderedPage for BrowserPage {
    fn url(&self) -> &str {
        &self.url
    }

    async fn title(&self) -> Result<String, CrawlError> {
        self.page
            .get_title()
            .await
            .map(Option::unwrap_or_default)
            .map_err(|e| CrawlError::RendererError(format!("Failed to read title: {e}")))
    }

    async fn inner_html(&self, selector: &Selector) -> Result<Option<String>, CrawlError> {
        let script = INNER_HTML_JS
            .replace("__SELECTOR__", &serde_json::to_string(selector.as_str())?)
            .replace("__XPATH__", if selector.is_xpath() { "true" } else { "false" });
        Ok(serde_json::from_value(self.evaluate_json(script).await?)?)
    }

    async fn links(&self) -> Result<Vec<String>, CrawlError> {
        let value = self.evaluate_json(LINKS_JS.to_string()).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn close(mut self) {
        self.closed = true;
        self.interceptor = None;
        if let Err(e) = self.page.clone().close().await {
            tracing::debug!(url = %self.url, error = %e, "Failed to close tab");
        }
    }
}
