use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use kbcrawl_client::{HtmdCleaner, KnowledgeBaseUploader, ReqwestFetcher, StaticRenderer};
use kbcrawl_core::models::Cookie;
use kbcrawl_core::traits::Renderer;
use kbcrawl_core::{CrawlConfig, CrawlSummary, Crawler, JsonLinesDataset, TracingCrawlReporter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum RendererKind {
    /// Plain HTTP GET, no JavaScript
    Static,
    /// Headless Chromium (requires the `browser` feature)
    Browser,
}

#[derive(Parser, Debug)]
#[command(
    name = "kbcrawl",
    version,
    about = "Crawl a site and upload its pages to a knowledge base"
)]
struct Cli {
    /// JSON config file; flags below override its fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed URL, or a sitemap URL
    #[arg(short, long)]
    url: Option<String>,

    /// Glob a discovered link must match (repeatable)
    #[arg(short = 'm', long = "match")]
    match_patterns: Vec<String>,

    /// Glob a discovered link must not match (repeatable)
    #[arg(short = 'x', long)]
    exclude: Vec<String>,

    /// CSS selector, or XPath when it starts with '/'
    #[arg(short, long)]
    selector: Option<String>,

    /// Maximum number of pages to crawl
    #[arg(long)]
    max_pages: Option<usize>,

    /// Milliseconds to wait for the selector
    #[arg(long)]
    wait_for_selector_timeout: Option<u64>,

    /// File extension whose requests are blocked (repeatable)
    #[arg(long = "resource-exclusion")]
    resource_exclusions: Vec<String>,

    /// Cookie to set before navigation, as name=value (repeatable)
    #[arg(long, value_parser = parse_cookie)]
    cookie: Vec<Cookie>,

    /// Knowledge-base API key
    #[arg(long, env = "KBCRAWL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Knowledge-base project ID
    #[arg(long, env = "KBCRAWL_PROJECT_ID")]
    project_id: Option<String>,

    /// Pages rendered in parallel
    #[arg(long)]
    concurrency: Option<usize>,

    /// Uploads in flight at once
    #[arg(long)]
    upload_concurrency: Option<usize>,

    /// Ingestion API base URL
    #[arg(long)]
    api_base_url: Option<String>,

    /// JSON Lines output file
    #[arg(short, long)]
    output: Option<String>,

    /// Page renderer
    #[arg(long, value_enum, default_value_t = RendererKind::Static)]
    renderer: RendererKind,

    /// Validate and print the resolved config without crawling
    #[arg(long, env = "NO_CRAWL")]
    no_crawl: bool,
}

fn parse_cookie(raw: &str) -> Result<Cookie, String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok(Cookie::new(name.trim(), value)),
        _ => Err(format!("expected name=value, got '{raw}'")),
    }
}

impl Cli {
    /// Start from the config file (or defaults) and apply every flag given.
    fn resolve_config(&self) -> Result<CrawlConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                CrawlConfig::from_json(&json)
                    .with_context(|| format!("Invalid config file: {}", path.display()))?
            }
            None => CrawlConfig::default(),
        };

        if let Some(url) = &self.url {
            config.url = url.clone();
        }
        if !self.match_patterns.is_empty() {
            config.match_patterns = self.match_patterns.clone();
        }
        if !self.exclude.is_empty() {
            config.exclude = self.exclude.clone();
        }
        if let Some(selector) = &self.selector {
            config.selector = selector.clone();
        }
        if let Some(max) = self.max_pages {
            config.max_pages_to_crawl = max;
        }
        if let Some(ms) = self.wait_for_selector_timeout {
            config.wait_for_selector_timeout = ms;
        }
        if !self.resource_exclusions.is_empty() {
            config.resource_exclusions = self.resource_exclusions.clone();
        }
        if !self.cookie.is_empty() {
            config.cookie = self.cookie.clone();
        }
        if let Some(key) = &self.api_key {
            config.api_key = key.clone();
        }
        if let Some(project) = &self.project_id {
            config.project_id = project.clone();
        }
        if let Some(n) = self.concurrency {
            config.max_concurrency = n;
        }
        if let Some(n) = self.upload_concurrency {
            config.upload_concurrency = n;
        }
        if let Some(base) = &self.api_base_url {
            config.api_base_url = base.clone();
        }
        if let Some(output) = &self.output {
            config.output_path = output.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("kbcrawl=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    config.validate()?;

    if cli.no_crawl {
        tracing::info!("Dry run, nothing will be fetched");
        println!("{}", serde_json::to_string_pretty(&config.redacted())?);
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight pages");
            on_signal.cancel();
        }
    });

    let summary = match cli.renderer {
        RendererKind::Static => {
            let renderer = StaticRenderer::with_timeout(config.navigation_timeout())
                .context("Failed to create HTTP client")?;
            crawl(config, renderer, cancel).await?
        }
        RendererKind::Browser => crawl_in_browser(config, cancel).await?,
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[cfg(feature = "browser")]
async fn crawl_in_browser(config: CrawlConfig, cancel: CancellationToken) -> Result<CrawlSummary> {
    let renderer = kbcrawl_client::BrowserRenderer::with_timeout(config.navigation_timeout())
        .await
        .context("Failed to launch browser")?;
    crawl(config, renderer, cancel).await
}

#[cfg(not(feature = "browser"))]
async fn crawl_in_browser(_config: CrawlConfig, _cancel: CancellationToken) -> Result<CrawlSummary> {
    anyhow::bail!("the browser renderer is not compiled in; rebuild with `--features browser`")
}

async fn crawl<R: Renderer>(
    config: CrawlConfig,
    renderer: R,
    cancel: CancellationToken,
) -> Result<CrawlSummary> {
    let dataset = JsonLinesDataset::create(&config.output_path)
        .await
        .with_context(|| format!("Failed to open dataset at {}", config.output_path))?;
    let uploader = KnowledgeBaseUploader::with_base_url(&config.api_base_url)
        .context("Failed to create upload client")?;
    let fetcher = ReqwestFetcher::with_timeout(config.navigation_timeout())
        .context("Failed to create HTTP client")?;

    tracing::info!(
        url = %config.url,
        max_pages = config.max_pages_to_crawl,
        output = %config.output_path,
        "Starting crawl"
    );

    let crawler = Crawler::new(config, renderer, fetcher, HtmdCleaner::new(), uploader, dataset);
    Ok(crawler.run(cancel, &TracingCrawlReporter).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, FromArgMatches};

    /// Parse flags with every `env` fallback removed, so exported
    /// credentials in the developer's shell can't leak into the result.
    fn parse_flags(args: &[&str]) -> Cli {
        let matches = Cli::command()
            .mut_args(|arg| arg.env(None::<&'static str>))
            .try_get_matches_from(args)
            .unwrap();
        Cli::from_arg_matches(&matches).unwrap()
    }

    #[test]
    fn parses_cookie_pairs() {
        assert_eq!(parse_cookie("session=a=b").unwrap(), Cookie::new("session", "a=b"));
        assert_eq!(parse_cookie("empty=").unwrap(), Cookie::new("empty", ""));
        assert!(parse_cookie("novalue").is_err());
        assert!(parse_cookie("=x").is_err());
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "url": "https://example.com/docs",
                "match": "https://example.com/docs/**",
                "selector": "main",
                "maxPagesToCrawl": 10,
                "VFAPIKey": "from-file",
                "projectID": "p1"
            }"#,
        )
        .unwrap();

        let cli = parse_flags(&[
            "kbcrawl",
            "--config",
            path.to_str().unwrap(),
            "--max-pages",
            "3",
            "--cookie",
            "lang=en",
            "--exclude",
            "**/archive/**",
        ]);
        let config = cli.resolve_config().unwrap();

        assert_eq!(config.url, "https://example.com/docs");
        assert_eq!(config.match_patterns, vec!["https://example.com/docs/**"]);
        assert_eq!(config.max_pages_to_crawl, 3);
        assert_eq!(config.exclude, vec!["**/archive/**"]);
        assert_eq!(config.cookie, vec![Cookie::new("lang", "en")]);
        assert_eq!(config.api_key, "from-file");
        assert_eq!(config.project_id, "p1");
        assert!(!cli.no_crawl);
        config.validate().unwrap();
    }

    #[test]
    fn flags_alone_build_a_config() {
        let cli = parse_flags(&[
            "kbcrawl",
            "--url",
            "https://example.com/sitemap.xml",
            "-m",
            "https://example.com/**",
            "--selector",
            "//*[@id=\"content\"]",
            "--api-key",
            "k",
            "--project-id",
            "p",
            "--renderer",
            "static",
        ]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.max_pages_to_crawl, 50);
        assert!(config.selector().is_xpath());
        config.validate().unwrap();
    }
}
