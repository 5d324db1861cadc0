use std::time::Duration;

use tokio::time::Instant;

use crate::error::CrawlError;
use crate::models::Selector;
use crate::traits::RenderedPage;

/// Interval between selector probes while waiting for it to appear.
pub const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Wait up to `timeout` for `selector` to match, then return the matched
/// node's inner HTML.
///
/// The selector is probed at least once, even with a zero timeout. A node
/// with no children yields an empty string. Renderer errors while probing
/// are returned as-is.
pub async fn extract<P: RenderedPage>(
    page: &P,
    selector: &Selector,
    timeout: Duration,
) -> Result<String, CrawlError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(html) = page.inner_html(selector).await? {
            return Ok(html);
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(CrawlError::SelectorTimeout {
                selector: selector.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        tokio::time::sleep(SELECTOR_POLL_INTERVAL.min(deadline - now)).await;
    }
}
