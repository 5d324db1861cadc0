//! End-to-end crawls against a wiremock site.
//!
//! The static renderer, text fetcher, htmd cleaner, multipart uploader and
//! JSON Lines dataset run together under the real orchestrator.

use kbcrawl_client::{HtmdCleaner, KnowledgeBaseUploader, ReqwestFetcher, StaticRenderer};
use kbcrawl_core::testutil::MockReporter;
use kbcrawl_core::{CrawlConfig, Crawler, JsonLinesDataset};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const UPLOAD_PATH: &str = "/v3/projects/proj-1/knowledge-base/documents/file";

fn html_page(title: &str, body: &str) -> String {
    format!(
        "<html><head><title>{title}</title><script>var x = 1;</script></head>\
         <body><nav>menu</nav><main id=\"content\">{body}</main><footer>legal</footer></body></html>"
    )
}

async fn serve(server: &MockServer, route: &str, html: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
        .mount(server)
        .await;
}

fn config(server: &MockServer, seed: &str, output: &std::path::Path) -> CrawlConfig {
    CrawlConfig {
        url: format!("{}{seed}", server.uri()),
        match_patterns: vec![format!("{}/docs/**", server.uri())],
        exclude: vec!["**/archive/**".into()],
        selector: "main".into(),
        wait_for_selector_timeout: 100,
        api_key: "VF.DM.test".into(),
        project_id: "proj-1".into(),
        api_base_url: server.uri(),
        output_path: output.display().to_string(),
        ..CrawlConfig::default()
    }
}

fn read_dataset(path: &std::path::Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

async fn crawl(cfg: CrawlConfig) -> kbcrawl_core::CrawlSummary {
    let dataset = JsonLinesDataset::create(&cfg.output_path).await.unwrap();
    let uploader = KnowledgeBaseUploader::with_base_url(&cfg.api_base_url).unwrap();
    let crawler = Crawler::new(
        cfg,
        StaticRenderer::new().unwrap(),
        ReqwestFetcher::new().unwrap(),
        HtmdCleaner::new(),
        uploader,
        dataset,
    );
    crawler
        .run(CancellationToken::new(), &MockReporter::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn sitemap_crawl_uploads_every_page_in_scope() {
    let server = MockServer::start().await;
    let base = server.uri();

    let sitemap = format!(
        "<?xml version=\"1.0\"?><urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\
         <url><loc>{base}/docs/a</loc></url><url><loc>{base}/docs/b</loc></url></urlset>"
    );
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sitemap, "application/xml"))
        .expect(1)
        .mount(&server)
        .await;

    serve(
        &server,
        "/docs/a",
        html_page(
            "Doc A",
            "<h1>Alpha</h1><a href=\"/docs/c\">C</a><a href=\"/docs/archive/old\">Old</a>\
             <a href=\"/blog/post\">Blog</a>",
        ),
    )
    .await;
    serve(&server, "/docs/b", html_page("Doc B", "<p>Bravo <a href=\"/docs/a\">A</a></p>")).await;
    serve(&server, "/docs/c", html_page("Doc C", "<p>Charlie</p>")).await;

    for never in ["/docs/archive/old", "/blog/post"] {
        Mock::given(method("GET"))
            .and(path(never))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
    }

    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"data": {"status": {"type": "PENDING"}}})),
        )
        .expect(3)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("storage/default.jsonl");
    let summary = crawl(config(&server, "/sitemap.xml", &output)).await;

    assert_eq!(summary.pages_dispatched, 3);
    assert_eq!(summary.pages_succeeded, 3);
    assert_eq!(summary.uploads_succeeded, 3);

    let records = read_dataset(&output);
    let mut titles: Vec<&str> = records.iter().filter_map(|r| r["title"].as_str()).collect();
    titles.sort();
    assert_eq!(titles, vec!["Doc A", "Doc B", "Doc C"]);

    let alpha = records.iter().find(|r| r["title"] == "Doc A").unwrap();
    let content = alpha["content"].as_str().unwrap();
    assert!(content.contains("# Alpha"), "{content}");
    assert!(!content.contains("legal"));
    assert!(!content.contains("var x"));
    assert_eq!(alpha["url"], format!("{}/docs/a", server.uri()));
}

#[tokio::test]
async fn rejected_uploads_leave_the_dataset_intact() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/docs/",
        html_page("Index", "<a href=\"/docs/one\">One</a><a href=\"/docs/two\">Two</a>"),
    )
    .await;
    serve(&server, "/docs/one", html_page("One", "<p>1</p>")).await;
    serve(&server, "/docs/two", html_page("Two", "<p>2</p>")).await;

    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.jsonl");
    let summary = crawl(config(&server, "/docs/", &output)).await;

    assert_eq!(summary.pages_succeeded, 3);
    assert_eq!(summary.uploads_failed, 3);
    assert_eq!(summary.uploads_succeeded, 0);
    assert_eq!(read_dataset(&output).len(), 3);
}

#[tokio::test]
async fn xpath_selector_and_budget_apply_end_to_end() {
    let server = MockServer::start().await;
    let links: String = (0..10)
        .map(|i| format!("<a href=\"/docs/p{i}\">p{i}</a>"))
        .collect();
    serve(&server, "/docs/", html_page("Hub", &links)).await;
    for i in 0..10 {
        serve(&server, &format!("/docs/p{i}"), html_page(&format!("P{i}"), "<p>leaf</p>")).await;
    }
    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.jsonl");
    let mut cfg = config(&server, "/docs/", &output);
    cfg.selector = "//*[@id=\"content\"]".into();
    cfg.max_pages_to_crawl = 4;
    cfg.max_concurrency = 2;

    let summary = crawl(cfg).await;
    assert_eq!(summary.pages_dispatched, 4);
    assert_eq!(summary.pages_succeeded, 4);
    assert_eq!(read_dataset(&output).len(), 4);
}
