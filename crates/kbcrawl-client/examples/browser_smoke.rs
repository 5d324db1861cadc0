/// Smoke-test for `BrowserRenderer`.
///
/// Launches a headless Chromium, renders <https://example.com> with images
/// blocked, and checks the `<h1>` region and outbound links.
///
/// Run with:
///   cargo run -p kbcrawl-client --example browser_smoke --features browser
use kbcrawl_client::BrowserRenderer;
use kbcrawl_core::models::{NavigationPolicy, Selector};
use kbcrawl_core::traits::{RenderedPage, Renderer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("Launching headless browser…");
    let renderer = BrowserRenderer::new().await?;

    let url = "https://example.com";
    let policy = NavigationPolicy::new(vec![], &["png".into(), "jpg".into()]);
    println!("Rendering {url} …");
    let page = renderer.render(url, &policy).await?;

    let title = page.title().await?;
    let heading = page.inner_html(&Selector::parse("//h1")).await?;
    let links = page.links().await?;
    page.close().await;

    anyhow::ensure!(title == "Example Domain", "unexpected title {title:?}");
    anyhow::ensure!(
        heading.as_deref() == Some("Example Domain"),
        "unexpected <h1>: {heading:?}"
    );

    println!("OK: title {title:?}, {} link(s)", links.len());
    for link in links {
        println!("  {link}");
    }
    Ok(())
}
