//! End-to-end runs against a mocked backend

use crate::common::{document, fast_config, scrape_ok};
use scrape_keeper::client::{ApiClient, CrawlRequest};
use scrape_keeper::manifest::{load_manifest, ManifestEntry, ManifestStatus, ResultManifest};
use scrape_keeper::output::MarkdownOptions;
use scrape_keeper::pipeline::{crawl_site, scrape_list, scrape_single, PageSink};
use scrape_keeper::FetchOutcome;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mock_scrape(server: &MockServer, url: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/v1/scrape"))
        .and(body_partial_json(json!({ "url": url })))
        .respond_with(response)
        .mount(server)
        .await;
}

fn markdown_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".md"))
        .collect();
    names.sort();
    names
}

fn urls(list: &[&str]) -> Vec<String> {
    list.iter().map(|url| url.to_string()).collect()
}

#[tokio::test]
async fn test_scrape_single_writes_file_without_manifest() {
    let server = MockServer::start().await;
    mock_scrape(
        &server,
        "https://example.com/",
        ResponseTemplate::new(200).set_body_json(scrape_ok("https://example.com/", "Home")),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config = fast_config(&server);
    let client = ApiClient::new(&config.api).unwrap();
    let sink = PageSink::new(dir.path(), MarkdownOptions { front_matter: true });

    let summary = scrape_single(&client, "https://example.com/", &sink).await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.exit_code(), 0);
    let files = markdown_files(dir.path());
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("example.com_index__"));
    let written = fs::read_to_string(dir.path().join(&files[0])).unwrap();
    assert!(written.starts_with("---\nurl: https://example.com/\ntitle: \"Home\"\n"));
    assert!(!sink.manifest().manifest_path().exists());
}

#[tokio::test]
async fn test_scrape_list_records_outcomes_and_resumes() {
    let server = MockServer::start().await;
    mock_scrape(
        &server,
        "https://example.com/one",
        ResponseTemplate::new(200).set_body_json(scrape_ok("https://example.com/one", "One")),
    )
    .await;
    mock_scrape(
        &server,
        "https://example.com/gone",
        ResponseTemplate::new(404).set_body_json(json!({ "success": false, "error": "Not found" })),
    )
    .await;
    mock_scrape(
        &server,
        "https://example.com/three",
        ResponseTemplate::new(200).set_body_json(scrape_ok("https://example.com/three", "Three")),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config = fast_config(&server);
    let client = Arc::new(ApiClient::new(&config.api).unwrap());
    let sink = PageSink::new(dir.path(), MarkdownOptions::default());
    let list = urls(&[
        "https://example.com/one",
        "https://example.com/gone",
        "https://example.com/three",
    ]);

    let summary = scrape_list(&client, &list, &sink, &config, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.permanent, 1);
    assert_eq!(summary.exit_code(), 1);

    let files = markdown_files(dir.path());
    assert_eq!(files.len(), 2);
    assert!(files[0].starts_with("0001_example.com_one__"));
    assert!(files[1].starts_with("0003_example.com_three__"));

    let manifest = load_manifest(sink.manifest().manifest_path()).unwrap();
    assert_eq!(manifest.len(), 3);
    assert_eq!(manifest["https://example.com/gone"].status, ManifestStatus::Error);
    assert_eq!(manifest["https://example.com/gone"].http_status, Some(404));
    let errors = load_manifest(sink.manifest().errors_path()).unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors.contains_key("https://example.com/gone"));

    // A second run only retries what did not succeed
    let again = scrape_list(&client, &list, &sink, &config, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(again.skipped, 2);
    assert_eq!(again.succeeded, 0);
    assert_eq!(again.failed, 1);
    assert_eq!(again.exit_code(), 2);
}

#[tokio::test]
async fn test_scrape_list_overwrite_refetches_everything() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/scrape"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(scrape_ok("https://example.com/a", "A")),
        )
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = fast_config(&server);
    let client = Arc::new(ApiClient::new(&config.api).unwrap());
    let sink = PageSink::new(dir.path(), MarkdownOptions::default());
    let list = urls(&["https://example.com/a"]);

    scrape_list(&client, &list, &sink, &config, &CancellationToken::new())
        .await
        .unwrap();
    config.output.overwrite = true;
    let summary = scrape_list(&client, &list, &sink, &config, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.succeeded, 1);
}

#[tokio::test]
async fn test_retryable_failure_recovers_in_retry_pass() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/scrape"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mock_scrape(
        &server,
        "https://example.com/flaky",
        ResponseTemplate::new(200).set_body_json(scrape_ok("https://example.com/flaky", "Flaky")),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config = fast_config(&server);
    let client = Arc::new(ApiClient::new(&config.api).unwrap());
    let sink = PageSink::new(dir.path(), MarkdownOptions::default());

    let summary = scrape_list(
        &client,
        &urls(&["https://example.com/flaky"]),
        &sink,
        &config,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.exit_code(), 0);

    let manifest = load_manifest(sink.manifest().manifest_path()).unwrap();
    assert_eq!(manifest["https://example.com/flaky"].status, ManifestStatus::Ok);
    assert!(!sink.manifest().errors_path().exists());
    assert!(markdown_files(dir.path())[0].starts_with("0001_"));
}

#[tokio::test]
async fn test_persistent_failure_lands_in_error_log() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/scrape"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = fast_config(&server);
    let client = Arc::new(ApiClient::new(&config.api).unwrap());
    let sink = PageSink::new(dir.path(), MarkdownOptions::default());

    let summary = scrape_list(
        &client,
        &urls(&["https://example.com/down"]),
        &sink,
        &config,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.permanent, 0);
    assert_eq!(summary.exit_code(), 2);
    let errors = load_manifest(sink.manifest().errors_path()).unwrap();
    assert_eq!(errors["https://example.com/down"].http_status, Some(500));
}

#[tokio::test]
async fn test_batch_mode_saves_polled_pages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/batch/scrape"))
        .and(body_partial_json(json!({ "formats": ["markdown"] })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "success": true, "id": "b-1" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/batch/scrape/b-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "total": 2,
            "completed": 2,
            "data": [
                document("https://example.com/a", 200, "# A"),
                document("https://example.com/b", 500, "")
            ]
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = fast_config(&server);
    config.scrape.batch = true;
    let client = Arc::new(ApiClient::new(&config.api).unwrap());
    let sink = PageSink::new(dir.path(), MarkdownOptions::default());

    let summary = scrape_list(
        &client,
        &urls(&["https://example.com/a", "https://example.com/b"]),
        &sink,
        &config,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    let files = markdown_files(dir.path());
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("0001_example.com_a__"));
}

async fn mock_crawl(server: &MockServer, pages: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/v1/crawl"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "success": true, "id": "c-1" })),
        )
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/crawl/c-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "total": 2,
            "completed": 2,
            "data": pages
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_crawl_saves_pages_and_recovers_failures() {
    let server = MockServer::start().await;
    mock_crawl(
        &server,
        json!([
            document("https://example.com/a", 200, "# A"),
            document("https://example.com/b", 502, "")
        ]),
    )
    .await;
    mock_scrape(
        &server,
        "https://example.com/b",
        ResponseTemplate::new(200).set_body_json(scrape_ok("https://example.com/b", "B")),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config = fast_config(&server);
    let client = Arc::new(ApiClient::new(&config.api).unwrap());
    let sink = PageSink::new(dir.path(), MarkdownOptions::default());
    let request = CrawlRequest::new("https://example.com", &config.crawl);

    let summary = crawl_site(&client, &request, &sink, &config, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.exit_code(), 0);

    let files = markdown_files(dir.path());
    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|name| name.starts_with("example.com_")));

    let manifest = load_manifest(sink.manifest().manifest_path()).unwrap();
    assert_eq!(manifest["https://example.com/b"].status, ManifestStatus::Ok);
    assert!(!sink.manifest().errors_path().exists());
}

#[tokio::test]
async fn test_crawl_skips_pages_saved_earlier() {
    let server = MockServer::start().await;
    mock_crawl(
        &server,
        json!([
            document("https://example.com/a", 200, "# A"),
            document("https://example.com/b", 200, "# B")
        ]),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let earlier = FetchOutcome {
        content: "# A".to_string(),
        http_status: Some(200),
        ..FetchOutcome::empty("https://example.com/a")
    };
    ResultManifest::new(dir.path())
        .record(&ManifestEntry::ok(&earlier, "a.md"))
        .unwrap();

    let config = fast_config(&server);
    let client = Arc::new(ApiClient::new(&config.api).unwrap());
    let sink = PageSink::new(dir.path(), MarkdownOptions::default());
    let request = CrawlRequest::new("https://example.com", &config.crawl);

    let summary = crawl_site(&client, &request, &sink, &config, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(markdown_files(dir.path()).len(), 1);
}

#[tokio::test]
async fn test_crawl_without_retries_logs_failures() {
    let server = MockServer::start().await;
    mock_crawl(&server, json!([document("https://example.com/x", 404, "")])).await;

    let dir = TempDir::new().unwrap();
    let mut config = fast_config(&server);
    config.crawl.max_retries = 0;
    let client = Arc::new(ApiClient::new(&config.api).unwrap());
    let sink = PageSink::new(dir.path(), MarkdownOptions::default());
    let request = CrawlRequest::new("https://example.com", &config.crawl);

    let summary = crawl_site(&client, &request, &sink, &config, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.exit_code(), 2);
    let errors = load_manifest(sink.manifest().errors_path()).unwrap();
    assert_eq!(errors["https://example.com/x"].http_status, Some(404));
}
