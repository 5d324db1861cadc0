pub mod config;
pub mod crawler;
pub mod dataset;
pub mod error;
pub mod extract;
pub mod frontier;
pub mod matcher;
pub mod models;
pub mod pipeline;
pub mod sitemap;
pub mod traits;
pub mod upload_queue;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::CrawlConfig;
pub use crawler::{CrawlEvent, CrawlPhase, CrawlReporter, Crawler, TracingCrawlReporter};
pub use dataset::JsonLinesDataset;
pub use error::CrawlError;
pub use models::{Cookie, CrawlSummary, NavigationPolicy, PageResult, Selector, UploadReceipt, UploadTask};
pub use traits::{Cleaner, Dataset, Fetcher, NoopHook, NullDataset, PageHook, RenderedPage, Renderer, Uploader};
