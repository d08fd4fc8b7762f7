//! Backend client module
//!
//! This module contains everything that talks to the scraping API:
//! - Typed views of its JSON payloads ([`FetchOutcome`], [`Job`], [`StatusPage`])
//! - The HTTP client ([`ApiClient`]) with request-level retries
//! - The WebSocket push transport ([`WsTransport`])
//!
//! The executor and coordinators depend on the traits below rather than on
//! the concrete client, which keeps them testable against in-process fakes.

mod api;
mod push;
mod types;

pub use api::{ws_base_url, ApiClient, CrawlRequest};
pub use push::WsTransport;
pub use types::{
    job_id_from_response, parse_document, parse_scrape_response, FetchOutcome, Job, JobStatus,
    PushMessage, StatusPage,
};

use crate::Result;
use async_trait::async_trait;

/// Single-page fetch operation
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches one URL; failures are reported inside the outcome
    async fn fetch_page(&self, url: &str) -> FetchOutcome;
}

/// Pull transport for crawl jobs
#[async_trait]
pub trait CrawlPoller: Send + Sync {
    /// Fetches the first page of a crawl job's status
    async fn crawl_status(&self, job_id: &str) -> Result<StatusPage>;

    /// Follows a `next` continuation link
    async fn crawl_status_next(&self, next: &str) -> Result<StatusPage>;

    /// Asks the backend to stop a crawl job
    async fn cancel_crawl(&self, job_id: &str) -> Result<()>;
}

/// Submission and pull transport for batch jobs
#[async_trait]
pub trait BatchPoller: Send + Sync {
    /// Submits the URLs as one batch job
    async fn start_batch(&self, urls: &[String]) -> Result<Job>;

    async fn batch_status(&self, job_id: &str) -> Result<StatusPage>;
}

/// Push transport for crawl jobs
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Opens a message stream for the job
    async fn open(&self, job_id: &str) -> Result<Box<dyn PushSession>>;
}

/// An open push stream
#[async_trait]
pub trait PushSession: Send {
    /// Reads the next message; `Ok(None)` means the peer closed the stream
    async fn next_message(&mut self) -> Result<Option<PushMessage>>;

    /// Closes the stream
    async fn close(&mut self) {}
}
