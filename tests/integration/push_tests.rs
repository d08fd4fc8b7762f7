//! Push transport tests against a local WebSocket server

use crate::common::{api_config, document};
use futures_util::SinkExt;
use scrape_keeper::client::{
    ApiClient, CrawlPoller, FetchOutcome, JobStatus, PushMessage, PushSession, PushTransport,
    WsTransport,
};
use scrape_keeper::coordinator::{JobEvent, StreamingCrawlCoordinator};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Accepts one WebSocket client, sends `frames`, then closes
async fn serve_frames(frames: Vec<String>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        for frame in frames {
            ws.send(Message::Text(frame)).await.unwrap();
        }
        let _ = ws.close(None).await;
    });

    format!("ws://{}", addr)
}

fn frame(kind: &str, data: serde_json::Value) -> String {
    json!({ "type": kind, "data": data }).to_string()
}

fn urls(pages: &[FetchOutcome]) -> Vec<&str> {
    pages.iter().map(|page| page.url.as_str()).collect()
}

#[tokio::test]
async fn test_ws_session_decodes_messages() {
    let base = serve_frames(vec![
        frame(
            "catchup",
            json!({
                "status": "scraping",
                "total": 3,
                "completed": 1,
                "data": [document("https://example.com/a", 200, "# A")]
            }),
        ),
        frame("document", document("https://example.com/b", 200, "# B")),
        frame("heartbeat", json!({})),
        frame("done", json!({})),
    ])
    .await;

    let transport = WsTransport::new(base, Duration::from_secs(5));
    let mut session = transport.open("job-1").await.unwrap();

    match session.next_message().await.unwrap() {
        Some(PushMessage::Catchup {
            total,
            completed,
            status,
            pages,
        }) => {
            assert_eq!(total, Some(3));
            assert_eq!(completed, Some(1));
            assert_eq!(status, Some(JobStatus::Scraping));
            assert_eq!(urls(&pages), vec!["https://example.com/a"]);
        }
        other => panic!("expected catchup, got {:?}", other),
    }
    match session.next_message().await.unwrap() {
        Some(PushMessage::Document(page)) => assert_eq!(page.url, "https://example.com/b"),
        other => panic!("expected document, got {:?}", other),
    }
    assert!(matches!(
        session.next_message().await.unwrap(),
        Some(PushMessage::Other(kind)) if kind == "heartbeat"
    ));
    assert!(matches!(session.next_message().await.unwrap(), Some(PushMessage::Done)));
    assert!(session.next_message().await.unwrap().is_none());
    session.close().await;
}

#[tokio::test]
async fn test_ws_open_against_http_endpoint_fails() {
    let server = MockServer::start().await;
    let client = ApiClient::new(&api_config(&server)).unwrap();

    let transport = WsTransport::new(client.ws_base_url(), Duration::from_secs(2));
    assert!(transport.open("job-1").await.is_err());
}

#[tokio::test]
async fn test_coordinator_switches_to_polling_without_duplicates() {
    // The socket drops after two pages, before any done message
    let base = serve_frames(vec![
        frame(
            "catchup",
            json!({
                "status": "scraping",
                "total": 3,
                "completed": 1,
                "data": [document("https://example.com/a", 200, "# A")]
            }),
        ),
        frame("document", document("https://example.com/b", 200, "# B")),
    ])
    .await;

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/crawl/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "total": 3,
            "completed": 3,
            "data": [
                document("https://example.com/a", 200, "# A"),
                document("https://example.com/b", 200, "# B"),
                document("https://example.com/c", 200, "# C")
            ]
        })))
        .mount(&server)
        .await;

    let client = Arc::new(ApiClient::new(&api_config(&server)).unwrap());
    let push: Arc<dyn PushTransport> = Arc::new(WsTransport::new(base, Duration::from_secs(5)));
    let coordinator = StreamingCrawlCoordinator::new(client as Arc<dyn CrawlPoller>, Some(push))
        .with_poll_interval(Duration::from_millis(100));

    let mut events = coordinator.run("job-1", CancellationToken::new());
    let mut seen = Vec::new();
    let mut degraded = 0;
    let mut last_status = None;
    while let Some(event) = events.recv().await {
        match event {
            JobEvent::Update(update) => {
                seen.extend(update.pages.into_iter().map(|page| page.url));
                last_status = Some(update.job.status);
            }
            JobEvent::Degraded(_) => degraded += 1,
            JobEvent::Aborted(reason) => panic!("aborted: {}", reason),
        }
    }

    assert_eq!(
        seen,
        vec![
            "https://example.com/a",
            "https://example.com/b",
            "https://example.com/c"
        ]
    );
    assert_eq!(degraded, 1);
    assert_eq!(last_status, Some(JobStatus::Completed));
}
