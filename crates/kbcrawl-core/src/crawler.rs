//! The crawl orchestrator.
//!
//! A run moves through `Idle → Seeding → Running → Draining → Done`. Page
//! tasks run on a `JoinSet` bounded by `maxConcurrency`; documents are handed
//! to the [`UploadQueue`] and delivered in the background. Only a config
//! validation error ends a run early. Every other failure stays with its
//! page or document.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::CrawlConfig;
use crate::error::CrawlError;
use crate::extract::extract;
use crate::frontier::{Dequeue, Dispatch, Frontier, normalize_url};
use crate::matcher::{UrlMatcher, is_sitemap};
use crate::models::{CrawlSummary, NavigationPolicy, Selector};
use crate::pipeline::DocumentPipeline;
use crate::sitemap::resolve_sitemap;
use crate::traits::{Cleaner, Dataset, Fetcher, NoopHook, PageHook, RenderedPage, Renderer, Uploader};
use crate::upload_queue::UploadQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlPhase {
    Idle,
    Seeding,
    Running,
    Draining,
    Done,
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CrawlPhase::Idle => "Idle",
            CrawlPhase::Seeding => "Seeding",
            CrawlPhase::Running => "Running",
            CrawlPhase::Draining => "Draining",
            CrawlPhase::Done => "Done",
        };
        f.write_str(name)
    }
}

/// Events emitted by the crawler for monitoring/logging.
#[derive(Debug, Clone)]
pub enum CrawlEvent<'a> {
    PhaseChanged {
        phase: CrawlPhase,
    },
    Seeded {
        seed: &'a str,
        from_sitemap: bool,
        enqueued: usize,
    },
    PageDispatched {
        ordinal: usize,
        max: usize,
        url: &'a str,
    },
    PageCompleted {
        url: &'a str,
        title: &'a str,
        links_enqueued: usize,
    },
    PageFailed {
        url: &'a str,
        error: &'a str,
    },
    /// The page redirected to a URL this run already crawls.
    PageSkipped {
        url: &'a str,
        canonical: &'a str,
    },
    BudgetExhausted {
        max: usize,
    },
    Cancelled,
    Finished {
        summary: &'a CrawlSummary,
    },
}

/// Trait for receiving crawl events (decoupled logging).
pub trait CrawlReporter: Send + Sync {
    fn report(&self, event: CrawlEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCrawlReporter;

impl CrawlReporter for TracingCrawlReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        match event {
            CrawlEvent::PhaseChanged { phase } => {
                tracing::debug!(%phase, "Crawl phase changed");
            }
            CrawlEvent::Seeded {
                seed,
                from_sitemap,
                enqueued,
            } => {
                tracing::info!(%seed, from_sitemap, enqueued, "Frontier seeded");
            }
            CrawlEvent::PageDispatched { ordinal, max, url } => {
                tracing::info!(ordinal, max, %url, "Crawling page");
            }
            CrawlEvent::PageCompleted {
                url,
                title,
                links_enqueued,
            } => {
                tracing::info!(%url, %title, links_enqueued, "Page processed");
            }
            CrawlEvent::PageFailed { url, error } => {
                tracing::warn!(%url, %error, "Page failed");
            }
            CrawlEvent::PageSkipped { url, canonical } => {
                tracing::info!(%url, %canonical, "Redirect target already seen, skipping page");
            }
            CrawlEvent::BudgetExhausted { max } => {
                tracing::info!(max, "Page budget reached, no further pages will be dispatched");
            }
            CrawlEvent::Cancelled => {
                tracing::info!("Cancellation requested, draining in-flight work");
            }
            CrawlEvent::Finished { summary } => {
                tracing::info!(
                    run_id = %summary.run_id,
                    pages_succeeded = summary.pages_succeeded,
                    pages_failed = summary.pages_failed,
                    pages_skipped = summary.pages_skipped,
                    uploads_succeeded = summary.uploads_succeeded,
                    uploads_failed = summary.uploads_failed,
                    cancelled = summary.cancelled,
                    "Crawl finished"
                );
            }
        }
    }
}

enum PageOutcome {
    Completed {
        url: String,
        title: String,
        links_enqueued: usize,
    },
    Failed {
        url: String,
        error: CrawlError,
    },
    Skipped {
        url: String,
        canonical: String,
    },
}

enum Visit {
    Processed { title: String, links_enqueued: usize },
    Redirected { canonical: String },
}

#[derive(Debug, Default)]
struct RunStats {
    succeeded: usize,
    failed: usize,
    skipped: usize,
    links_enqueued: usize,
}

/// Per-run state shared by every page task of that run.
struct RunContext<R, C, U, D, H>
where
    R: Renderer,
    C: Cleaner,
    U: Uploader,
    D: Dataset,
{
    renderer: R,
    dataset: D,
    hook: Arc<H>,
    pipeline: DocumentPipeline<C>,
    uploads: UploadQueue<U>,
    frontier: Frontier,
    matcher: UrlMatcher,
    selector: Selector,
    policy: NavigationPolicy,
    selector_timeout: Duration,
    navigation_timeout: Duration,
}

impl<R, C, U, D, H> RunContext<R, C, U, D, H>
where
    R: Renderer,
    C: Cleaner + 'static,
    U: Uploader,
    D: Dataset,
    H: PageHook<R::Page>,
{
    async fn process(&self, dispatch: Dispatch) -> PageOutcome {
        match self.visit(&dispatch.url).await {
            Ok(Visit::Processed {
                title,
                links_enqueued,
            }) => PageOutcome::Completed {
                url: dispatch.url,
                title,
                links_enqueued,
            },
            Ok(Visit::Redirected { canonical }) => PageOutcome::Skipped {
                url: dispatch.url,
                canonical,
            },
            Err(error) => PageOutcome::Failed {
                url: dispatch.url,
                error,
            },
        }
    }

    /// Render and process one page. `render` is dropped mid-flight when the
    /// navigation timeout fires, so renderers must release their resources
    /// on drop.
    async fn visit(&self, url: &str) -> Result<Visit, CrawlError> {
        let page = tokio::time::timeout(
            self.navigation_timeout,
            self.renderer.render(url, &self.policy),
        )
        .await
        .map_err(|_| CrawlError::Timeout(self.navigation_timeout.as_millis() as u64))??;

        if self.redirected_to_seen(url, page.url()) {
            let canonical = page.url().to_string();
            page.close().await;
            return Ok(Visit::Redirected { canonical });
        }

        let outcome = self.handle(&page).await;
        page.close().await;
        outcome
    }

    /// Mark the post-redirect URL seen. True when it was already seen, so
    /// the page is crawled (or queued) under that URL instead.
    fn redirected_to_seen(&self, requested: &str, landed: &str) -> bool {
        match normalize_url(landed) {
            Some(landed) if Some(&landed) != normalize_url(requested).as_ref() => {
                !self.frontier.mark_seen(&landed)
            }
            _ => false,
        }
    }

    async fn handle(&self, page: &R::Page) -> Result<Visit, CrawlError> {
        let html = extract(page, &self.selector, self.selector_timeout).await?;
        let title = page.title().await?;
        let result = self.pipeline.build_result(&title, page.url(), &html)?;

        match serde_json::to_value(&result) {
            Ok(record) => {
                if let Err(e) = self.dataset.push(&record).await {
                    tracing::warn!(url = %result.url, error = %e, "Failed to persist page result");
                }
            }
            Err(e) => tracing::warn!(url = %result.url, error = %e, "Failed to serialize page result"),
        }

        if let Err(e) = self.hook.on_visit_page(page, &self.dataset).await {
            tracing::warn!(url = %result.url, error = %e, "Page hook failed");
        }

        self.uploads.submit(self.pipeline.process(&result));

        let links = match page.links().await {
            Ok(links) => links,
            Err(e) => {
                tracing::warn!(url = %result.url, error = %e, "Failed to enumerate links");
                Vec::new()
            }
        };
        let allowed = links
            .iter()
            .filter_map(|link| normalize_url(link))
            .filter(|link| self.matcher.is_allowed(link));
        let enqueued = self.frontier.enqueue_discovered(allowed);

        Ok(Visit::Processed {
            title: result.title,
            links_enqueued: enqueued,
        })
    }
}

/// Crawls a site and feeds every extracted page to the knowledge base.
pub struct Crawler<R, F, C, U, D, H = NoopHook> {
    config: CrawlConfig,
    renderer: R,
    fetcher: F,
    cleaner: C,
    uploader: U,
    dataset: D,
    hook: Arc<H>,
}

impl<R, F, C, U, D> Crawler<R, F, C, U, D, NoopHook>
where
    R: Renderer,
    F: Fetcher,
    C: Cleaner + 'static,
    U: Uploader,
    D: Dataset,
{
    pub fn new(config: CrawlConfig, renderer: R, fetcher: F, cleaner: C, uploader: U, dataset: D) -> Self {
        Self {
            config,
            renderer,
            fetcher,
            cleaner,
            uploader,
            dataset,
            hook: Arc::new(NoopHook),
        }
    }
}

impl<R, F, C, U, D, H> Crawler<R, F, C, U, D, H>
where
    R: Renderer,
    F: Fetcher,
    C: Cleaner + 'static,
    U: Uploader,
    D: Dataset,
    H: PageHook<R::Page>,
{
    /// Replace the per-page hook.
    pub fn with_hook<H2: PageHook<R::Page>>(self, hook: H2) -> Crawler<R, F, C, U, D, H2> {
        Crawler {
            config: self.config,
            renderer: self.renderer,
            fetcher: self.fetcher,
            cleaner: self.cleaner,
            uploader: self.uploader,
            dataset: self.dataset,
            hook: Arc::new(hook),
        }
    }

    /// Run one crawl to completion.
    ///
    /// Each call starts from a fresh frontier and budget. Cancelling `cancel`
    /// stops new dispatch; work already started still finishes.
    pub async fn run<CR: CrawlReporter>(
        &self,
        cancel: CancellationToken,
        reporter: &CR,
    ) -> Result<CrawlSummary, CrawlError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        self.config.validate()?;
        let ctx = Arc::new(self.context()?);

        reporter.report(CrawlEvent::PhaseChanged {
            phase: CrawlPhase::Seeding,
        });
        self.seed(&ctx.frontier, reporter).await;

        reporter.report(CrawlEvent::PhaseChanged {
            phase: CrawlPhase::Running,
        });
        let mut tasks = JoinSet::new();
        let mut stats = RunStats::default();
        let mut cancelled = false;

        loop {
            if cancel.is_cancelled() {
                cancelled = true;
                reporter.report(CrawlEvent::Cancelled);
                break;
            }

            while tasks.len() < self.config.max_concurrency {
                let Dequeue::Next(dispatch) = ctx.frontier.dequeue() else {
                    break;
                };
                reporter.report(CrawlEvent::PageDispatched {
                    ordinal: dispatch.ordinal,
                    max: ctx.frontier.max_pages(),
                    url: &dispatch.url,
                });
                let task_ctx = Arc::clone(&ctx);
                tasks.spawn(async move { task_ctx.process(dispatch).await });
            }

            if ctx.frontier.is_budget_exhausted() {
                reporter.report(CrawlEvent::BudgetExhausted {
                    max: ctx.frontier.max_pages(),
                });
                break;
            }
            if tasks.is_empty() {
                break;
            }

            tokio::select! {
                joined = tasks.join_next() => {
                    if let Some(joined) = joined {
                        record_outcome(joined, &mut stats, reporter);
                    }
                }
                () = cancel.cancelled() => {}
            }
        }

        reporter.report(CrawlEvent::PhaseChanged {
            phase: CrawlPhase::Draining,
        });
        while let Some(joined) = tasks.join_next().await {
            record_outcome(joined, &mut stats, reporter);
        }
        let uploads = ctx.uploads.drain().await;

        let summary = CrawlSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            pages_dispatched: ctx.frontier.dispatched(),
            pages_succeeded: stats.succeeded,
            pages_failed: stats.failed,
            pages_skipped: stats.skipped,
            links_enqueued: stats.links_enqueued,
            uploads_succeeded: uploads.succeeded,
            uploads_failed: uploads.failed,
            cancelled,
        };
        reporter.report(CrawlEvent::Finished { summary: &summary });
        reporter.report(CrawlEvent::PhaseChanged {
            phase: CrawlPhase::Done,
        });

        Ok(summary)
    }

    fn context(&self) -> Result<RunContext<R, C, U, D, H>, CrawlError> {
        Ok(RunContext {
            renderer: self.renderer.clone(),
            dataset: self.dataset.clone(),
            hook: Arc::clone(&self.hook),
            pipeline: DocumentPipeline::new(
                self.cleaner.clone(),
                self.config.api_key.clone(),
                self.config.project_id.clone(),
            ),
            uploads: UploadQueue::new(self.uploader.clone(), self.config.upload_concurrency),
            frontier: Frontier::new(self.config.max_pages_to_crawl),
            matcher: UrlMatcher::new(&self.config.match_patterns, &self.config.exclude)?,
            selector: self.config.selector(),
            policy: self.config.navigation_policy(),
            selector_timeout: self.config.selector_timeout(),
            navigation_timeout: self.config.navigation_timeout(),
        })
    }

    /// Queue the seed URL, or every URL its sitemap lists.
    ///
    /// A sitemap seed is marked seen and never rendered itself. An
    /// unreadable sitemap leaves the frontier empty.
    async fn seed<CR: CrawlReporter>(&self, frontier: &Frontier, reporter: &CR) {
        let seed = self.config.url.trim();
        let from_sitemap = is_sitemap(seed);

        let enqueued = if from_sitemap {
            frontier.mark_seen(seed);
            match resolve_sitemap(&self.fetcher, seed).await {
                Ok(urls) => frontier.seed(urls),
                Err(e) => {
                    tracing::error!(url = %seed, error = %e, "Failed to resolve sitemap seed");
                    0
                }
            }
        } else {
            frontier.seed([seed])
        };

        reporter.report(CrawlEvent::Seeded {
            seed,
            from_sitemap,
            enqueued,
        });
    }
}

fn record_outcome<CR: CrawlReporter>(
    joined: Result<PageOutcome, JoinError>,
    stats: &mut RunStats,
    reporter: &CR,
) {
    match joined {
        Ok(PageOutcome::Completed {
            url,
            title,
            links_enqueued,
        }) => {
            stats.succeeded += 1;
            stats.links_enqueued += links_enqueued;
            reporter.report(CrawlEvent::PageCompleted {
                url: &url,
                title: &title,
                links_enqueued,
            });
        }
        Ok(PageOutcome::Failed { url, error }) => {
            stats.failed += 1;
            let error = error.to_string();
            reporter.report(CrawlEvent::PageFailed {
                url: &url,
                error: &error,
            });
        }
        Ok(PageOutcome::Skipped { url, canonical }) => {
            stats.skipped += 1;
            reporter.report(CrawlEvent::PageSkipped {
                url: &url,
                canonical: &canonical,
            });
        }
        Err(e) => {
            stats.failed += 1;
            tracing::error!(error = %e, "Page task panicked");
        }
    }
}
