//! Backend client tests

use crate::common::{api_config, document, scrape_ok};
use scrape_keeper::client::{ApiClient, BatchPoller, CrawlPoller, CrawlRequest, JobStatus};
use scrape_keeper::config::{ApiConfig, CrawlConfig};
use scrape_keeper::{classify, Classification, KeeperError};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_scrape_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/scrape"))
        .and(body_partial_json(json!({
            "url": "https://example.com/docs",
            "formats": ["markdown"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(scrape_ok(
            "https://example.com/docs/",
            "Docs",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(&api_config(&server)).unwrap();
    let outcome = client.scrape_url("https://example.com/docs").await;

    assert!(outcome.is_success());
    assert_eq!(outcome.url, "https://example.com/docs");
    assert_eq!(outcome.source_url.as_deref(), Some("https://example.com/docs/"));
    assert_eq!(outcome.title.as_deref(), Some("Docs"));
    assert_eq!(outcome.content, "# Docs\n");
}

#[tokio::test]
async fn test_scrape_api_error_keeps_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/scrape"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({ "success": false, "error": "Not found" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(&api_config(&server)).unwrap();
    let outcome = client.scrape_url("https://example.com/missing").await;

    assert!(!outcome.is_success());
    assert_eq!(outcome.http_status, Some(404));
    assert_eq!(outcome.error.as_deref(), Some("Not found"));
    assert_eq!(classify(outcome.http_status), Classification::Permanent);
}

#[tokio::test]
async fn test_scrape_rate_limit_is_not_retried_by_client() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/scrape"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(&api_config(&server)).unwrap();
    let outcome = client.scrape_url("https://example.com/").await;

    assert_eq!(outcome.http_status, Some(429));
    assert_eq!(outcome.error_summary(), "HTTP 429");
    assert_eq!(classify(outcome.http_status), Classification::Retryable);
}

#[tokio::test]
async fn test_scrape_page_status_from_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/scrape"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "markdown": "Forbidden",
                "metadata": { "statusCode": 403 }
            }
        })))
        .mount(&server)
        .await;

    let client = ApiClient::new(&api_config(&server)).unwrap();
    let outcome = client.scrape_url("https://example.com/private").await;

    assert!(!outcome.is_success());
    assert_eq!(outcome.http_status, Some(403));
}

#[tokio::test]
async fn test_scrape_network_failure_has_no_status() {
    let config = ApiConfig {
        url: "http://127.0.0.1:9".to_string(),
        timeout_secs: 2,
        ..ApiConfig::default()
    };
    let client = ApiClient::new(&config).unwrap();
    let outcome = client.scrape_url("https://example.com/").await;

    assert_eq!(outcome.http_status, None);
    assert!(outcome.error_summary().starts_with("Request failed"));
    assert_eq!(classify(outcome.http_status), Classification::Retryable);
}

#[tokio::test]
async fn test_start_crawl_sends_only_enabled_switches() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/crawl"))
        .and(body_partial_json(json!({
            "url": "https://example.com",
            "limit": 25,
            "ignoreSitemap": true,
            "scrapeOptions": { "formats": ["markdown"] }
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "success": true, "id": "crawl-7" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let crawl = CrawlConfig {
        limit: 25,
        ignore_sitemap: true,
        ..CrawlConfig::default()
    };
    let request = CrawlRequest::new("https://example.com", &crawl);
    let body = request.to_body();
    assert!(body.get("allowExternalLinks").is_none());

    let client = ApiClient::new(&api_config(&server)).unwrap();
    let job = client.start_crawl(&request).await.unwrap();

    assert_eq!(job.job_id, "crawl-7");
}

#[tokio::test]
async fn test_start_crawl_job_id_from_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/crawl"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "url": "http://internal:3002/v1/crawl/abc-123"
        })))
        .mount(&server)
        .await;

    let client = ApiClient::new(&api_config(&server)).unwrap();
    let request = CrawlRequest::new("https://example.com", &CrawlConfig::default());
    let job = client.start_crawl(&request).await.unwrap();

    assert_eq!(job.job_id, "abc-123");
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/crawl"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(&api_config(&server)).unwrap();
    let request = CrawlRequest::new("https://example.com", &CrawlConfig::default());
    let result = client.start_crawl(&request).await;

    assert!(matches!(result, Err(KeeperError::Status { status: 400, .. })));
}

#[tokio::test]
async fn test_crawl_status_parses_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/crawl/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "scraping",
            "total": 5,
            "completed": 2,
            "data": [
                document("https://example.com/a", 200, "# A"),
                document("https://example.com/b", 200, "# B")
            ],
            "next": "http://internal:3002/v1/crawl/job-1?skip=2"
        })))
        .mount(&server)
        .await;

    let client = ApiClient::new(&api_config(&server)).unwrap();
    let page = client.crawl_status("job-1").await.unwrap();

    assert_eq!(page.status, Some(JobStatus::Scraping));
    assert_eq!(page.total, 5);
    assert_eq!(page.completed, 2);
    assert_eq!(page.pages.len(), 2);
    assert_eq!(page.pages[1].url, "https://example.com/b");
    assert_eq!(page.next.as_deref(), Some("http://internal:3002/v1/crawl/job-1?skip=2"));
}

#[tokio::test]
async fn test_continuation_link_is_retargeted_at_api_base() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/crawl/job-1"))
        .and(query_param("skip", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "data": [document("https://example.com/c", 200, "# C")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(&api_config(&server)).unwrap();
    let page = client
        .crawl_status_next("http://internal:3002/v1/crawl/job-1?skip=2")
        .await
        .unwrap();

    assert_eq!(page.status, Some(JobStatus::Completed));
    assert_eq!(page.pages[0].url, "https://example.com/c");
    assert!(page.next.is_none());
}

#[tokio::test]
async fn test_status_request_retries_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/batch/scrape/b-1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/batch/scrape/b-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "total": 1,
            "completed": 1,
            "data": [document("https://example.com/", 200, "# Home")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(&api_config(&server)).unwrap();
    let page = client.batch_status("b-1").await.unwrap();

    assert_eq!(page.status, Some(JobStatus::Completed));
    assert_eq!(page.pages.len(), 1);
}

#[tokio::test]
async fn test_status_request_gives_up_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/crawl/job-9"))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&server)
        .await;

    let client = ApiClient::new(&api_config(&server)).unwrap();
    let result = client.crawl_status("job-9").await;

    assert!(matches!(result, Err(KeeperError::Status { status: 502, .. })));
}

#[tokio::test]
async fn test_cancel_crawl() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/crawl/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "cancelled" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(&api_config(&server)).unwrap();
    client.cancel_crawl("job-1").await.unwrap();
}
