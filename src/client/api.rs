//! HTTP client for the scraping API
//!
//! This module wraps every backend endpoint the crate uses:
//! - single-page scrape (never fails, reports through [`FetchOutcome`])
//! - batch scrape submission and status
//! - crawl start, status, pagination and cancellation
//!
//! Status, batch and crawl calls carry their own request-level retry policy
//! for transient failures. The single-page scrape is attempted exactly once
//! because the sequential executor owns its retry policy.

use crate::client::types::{
    bool_field, job_id_from_response, parse_scrape_response, str_field, FetchOutcome, Job,
    StatusPage,
};
use crate::client::{BatchPoller, CrawlPoller, PageFetcher};
use crate::config::{ApiConfig, CrawlConfig};
use crate::retry::{backoff_delay, is_request_retryable, BASE_BACKOFF};
use crate::{KeeperError, Result};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Map, Value};
use std::time::Duration;
use url::Url;

/// Cap on the request-level backoff
const MAX_REQUEST_BACKOFF: Duration = Duration::from_secs(30);

/// Handle on the backend API
///
/// One handle is shared (through `Arc`) by every executor and coordinator of
/// a run; its connection pool is released when the last reference drops.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    request_retries: u32,
}

impl ApiClient {
    /// Builds a client from the API configuration
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let base = Url::parse(&config.url)?;
        let http = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(10).min(config.timeout()))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            http,
            base_url: base.as_str().trim_end_matches('/').to_string(),
            request_retries: config.request_retries,
        })
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// WebSocket base derived from the HTTP base (`http→ws`, `https→wss`)
    pub fn ws_base_url(&self) -> String {
        ws_base_url(&self.base_url)
    }

    /// Scrapes a single URL into markdown
    ///
    /// Failures never surface as `Err`: HTTP errors keep their status code and
    /// the backend's `error` message, network errors have no status at all.
    pub async fn scrape_url(&self, url: &str) -> FetchOutcome {
        let endpoint = self.endpoint("/v1/scrape");
        let body = json!({ "url": url, "formats": ["markdown"] });

        tracing::debug!("Scraping {}", url);
        let response = match self.http.post(&endpoint).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Scrape request for {} failed: {}", url, e);
                return FetchOutcome::failed(url, None, format!("Request failed: {}", e));
            }
        };

        let status = response.status().as_u16();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                return FetchOutcome::failed(
                    url,
                    Some(status),
                    format!("Failed to read response: {}", e),
                )
            }
        };

        if !(200..300).contains(&status) {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| str_field(&v, "error"))
                .unwrap_or_else(|| format!("HTTP {}", status));
            return FetchOutcome::failed(url, Some(status), message);
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(value) => parse_scrape_response(url, &value),
            Err(e) => FetchOutcome::failed(url, Some(status), format!("Invalid response: {}", e)),
        }
    }

    /// Submits a batch scrape job
    pub async fn start_batch(&self, urls: &[String]) -> Result<Job> {
        let body = json!({ "urls": urls, "formats": ["markdown"] });
        let response = self
            .request_json(Method::POST, "/v1/batch/scrape", Some(&body))
            .await?;
        let job_id = accepted_job_id(&response, "Failed to start batch job")?;

        tracing::info!("Started batch job {} for {} URLs", job_id, urls.len());
        Ok(Job {
            total: urls.len() as u64,
            ..Job::new(job_id)
        })
    }

    /// Starts a crawl job
    pub async fn start_crawl(&self, request: &CrawlRequest) -> Result<Job> {
        let body = request.to_body();
        let response = self.request_json(Method::POST, "/v1/crawl", Some(&body)).await?;
        let job_id = accepted_job_id(&response, "Failed to start crawl")?;

        tracing::info!("Started crawl job {} from {}", job_id, request.url);
        Ok(Job::new(job_id))
    }

    /// Best-effort cancellation of a crawl job
    pub async fn cancel_crawl(&self, job_id: &str) -> Result<()> {
        self.request_json(Method::DELETE, &format!("/v1/crawl/{}", job_id), None)
            .await
            .map(|_| ())
    }

    /// Builds the absolute URL for an API path
    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Re-targets an absolute continuation link at the configured base
    ///
    /// The backend may advertise its internal hostname in `next`; only the
    /// path and query are kept.
    fn continuation_path(next: &str) -> Result<String> {
        let parsed = Url::parse(next)?;
        Ok(match parsed.query() {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_string(),
        })
    }

    /// Sends a request and decodes the JSON body, retrying transient failures
    async fn request_json(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = self.endpoint(path);
        let mut attempt = 0;

        loop {
            let mut request = self.http.request(method.clone(), &url);
            if let Some(body) = body {
                request = request.json(body);
            }

            let failure = match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let text = response.text().await.map_err(|source| KeeperError::Http {
                        url: url.clone(),
                        source,
                    })?;

                    if (200..300).contains(&status) {
                        if text.trim().is_empty() {
                            return Ok(Value::Null);
                        }
                        return Ok(serde_json::from_str(&text)?);
                    }

                    let error = KeeperError::Status {
                        url: url.clone(),
                        status,
                        body: text,
                    };
                    if !is_request_retryable(status) {
                        return Err(error);
                    }
                    error
                }
                Err(source) => {
                    let transient =
                        source.is_timeout() || source.is_connect() || source.is_request();
                    let error = if source.is_timeout() {
                        KeeperError::Timeout { url: url.clone() }
                    } else {
                        KeeperError::Http {
                            url: url.clone(),
                            source,
                        }
                    };
                    if !transient {
                        return Err(error);
                    }
                    error
                }
            };

            if attempt >= self.request_retries {
                return Err(failure);
            }

            let delay = backoff_delay(attempt, BASE_BACKOFF, MAX_REQUEST_BACKOFF);
            tracing::warn!(
                "{} {} failed ({}), retrying in {:?}",
                method,
                path,
                failure,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl PageFetcher for ApiClient {
    async fn fetch_page(&self, url: &str) -> FetchOutcome {
        self.scrape_url(url).await
    }
}

#[async_trait]
impl CrawlPoller for ApiClient {
    async fn crawl_status(&self, job_id: &str) -> Result<StatusPage> {
        let value = self
            .request_json(Method::GET, &format!("/v1/crawl/{}", job_id), None)
            .await?;
        Ok(StatusPage::from_value(&value))
    }

    async fn crawl_status_next(&self, next: &str) -> Result<StatusPage> {
        let path = Self::continuation_path(next)?;
        let value = self.request_json(Method::GET, &path, None).await?;
        Ok(StatusPage::from_value(&value))
    }

    async fn cancel_crawl(&self, job_id: &str) -> Result<()> {
        ApiClient::cancel_crawl(self, job_id).await
    }
}

#[async_trait]
impl BatchPoller for ApiClient {
    async fn start_batch(&self, urls: &[String]) -> Result<Job> {
        ApiClient::start_batch(self, urls).await
    }

    async fn batch_status(&self, job_id: &str) -> Result<StatusPage> {
        let value = self
            .request_json(Method::GET, &format!("/v1/batch/scrape/{}", job_id), None)
            .await?;
        Ok(StatusPage::from_value(&value))
    }
}

/// Parameters of a crawl job
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub url: String,
    pub limit: u32,
    pub max_depth: u32,
    pub max_concurrency: u32,
    pub delay_secs: f64,
    pub wait_for_ms: u64,
    pub include_paths: Vec<String>,
    pub exclude_paths: Vec<String>,
    pub allow_backward_links: bool,
    pub allow_external_links: bool,
    pub allow_subdomains: bool,
    pub ignore_sitemap: bool,
    pub ignore_robots_txt: bool,
}

impl CrawlRequest {
    pub fn new(url: impl Into<String>, config: &CrawlConfig) -> Self {
        Self {
            url: url.into(),
            limit: config.limit,
            max_depth: config.max_depth,
            max_concurrency: config.max_concurrency,
            delay_secs: config.delay_secs,
            wait_for_ms: config.wait_for_ms,
            include_paths: config.include_paths.clone(),
            exclude_paths: config.exclude_paths.clone(),
            allow_backward_links: config.allow_backward_links,
            allow_external_links: config.allow_external_links,
            allow_subdomains: config.allow_subdomains,
            ignore_sitemap: config.ignore_sitemap,
            ignore_robots_txt: config.ignore_robots_txt,
        }
    }

    /// Request body; optional switches are only sent when enabled
    pub fn to_body(&self) -> Value {
        let mut scrape_options = Map::new();
        scrape_options.insert("formats".to_string(), json!(["markdown"]));
        if self.wait_for_ms > 0 {
            scrape_options.insert("waitFor".to_string(), json!(self.wait_for_ms));
        }

        let mut body = Map::new();
        body.insert("url".to_string(), json!(self.url));
        body.insert("limit".to_string(), json!(self.limit));
        body.insert("maxDepth".to_string(), json!(self.max_depth));
        body.insert("maxConcurrency".to_string(), json!(self.max_concurrency));
        body.insert("scrapeOptions".to_string(), Value::Object(scrape_options));

        if self.delay_secs > 0.0 {
            body.insert("delay".to_string(), json!(self.delay_secs));
        }
        if !self.include_paths.is_empty() {
            body.insert("includePaths".to_string(), json!(self.include_paths));
        }
        if !self.exclude_paths.is_empty() {
            body.insert("excludePaths".to_string(), json!(self.exclude_paths));
        }

        let switches = [
            ("allowBackwardLinks", self.allow_backward_links),
            ("allowExternalLinks", self.allow_external_links),
            ("allowSubdomains", self.allow_subdomains),
            ("ignoreSitemap", self.ignore_sitemap),
            ("ignoreRobotsTxt", self.ignore_robots_txt),
        ];
        for (key, enabled) in switches {
            if enabled {
                body.insert(key.to_string(), Value::Bool(true));
            }
        }

        Value::Object(body)
    }
}

/// Derives the WebSocket base from an HTTP base URL
pub fn ws_base_url(base_url: &str) -> String {
    if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base_url.to_string()
    }
}

/// Reads the job id out of a start response, rejecting `success: false`
fn accepted_job_id(response: &Value, fallback_error: &str) -> Result<String> {
    if !bool_field(response, "success") {
        let error = str_field(response, "error").unwrap_or_else(|| fallback_error.to_string());
        return Err(KeeperError::Api(error));
    }
    job_id_from_response(response)
        .ok_or_else(|| KeeperError::Api(format!("{}: response carried no job id", fallback_error)))
}
