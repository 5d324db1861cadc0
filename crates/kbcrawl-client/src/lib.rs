pub mod cleaner;
pub mod fetcher;
pub mod static_renderer;
pub mod uploader;
pub mod xpath;

#[cfg(feature = "browser")]
pub mod browser_renderer;

#[cfg(feature = "browser")]
pub use browser_renderer::{BrowserPage, BrowserRenderer};
pub use cleaner::HtmdCleaner;
pub use fetcher::ReqwestFetcher;
pub use static_renderer::{StaticPage, StaticRenderer};
pub use uploader::KnowledgeBaseUploader;
pub use xpath::xpath_to_css;
