//! Typed views of the backend's JSON payloads
//!
//! The backend answers with loosely shaped JSON. Everything is converted into
//! [`FetchOutcome`], [`Job`] and friends right here, with every missing or
//! mistyped field defaulted explicitly, so no `serde_json::Value` escapes
//! this module.

use crate::retry::is_success_status;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;

/// Result of attempting one URL
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    /// The requested address, preserved verbatim
    pub url: String,

    /// Markdown content, empty on failure
    pub content: String,

    /// HTTP status reported for the page (or by the API on request failure)
    pub http_status: Option<u16>,

    /// Error description, when the backend or transport gave one
    pub error: Option<String>,

    pub title: Option<String>,
    pub description: Option<String>,

    /// The address the backend says it actually fetched
    pub source_url: Option<String>,

    pub fetched_at: DateTime<Utc>,
}

impl FetchOutcome {
    /// Creates an outcome with no content and no status
    pub fn empty(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content: String::new(),
            http_status: None,
            error: None,
            title: None,
            description: None,
            source_url: None,
            fetched_at: Utc::now(),
        }
    }

    /// Creates a failed outcome
    pub fn failed(
        url: impl Into<String>,
        http_status: Option<u16>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            http_status,
            error: Some(error.into()),
            ..Self::empty(url)
        }
    }

    /// True only for a 2xx status with non-empty content
    ///
    /// A 2xx soft-block page without content is a failure, and so is a
    /// non-2xx error page that happens to carry text.
    pub fn is_success(&self) -> bool {
        self.http_status.map(is_success_status).unwrap_or(false) && !self.content.is_empty()
    }

    /// Human-readable reason for a failure
    pub fn error_summary(&self) -> String {
        match (&self.error, self.http_status) {
            (Some(error), _) => error.clone(),
            (None, Some(status)) => format!("HTTP {}", status),
            (None, None) => "no content returned".to_string(),
        }
    }
}

/// Status of a batch or crawl job on the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    Scraping,
    Completed,
    Failed,
    Cancelled,
    /// A status string this client does not know
    Unknown,
}

impl JobStatus {
    /// Parses the backend's status string
    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "scraping" | "running" => Self::Scraping,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            _ => Self::Unknown,
        }
    }

    /// Returns true once the job will not produce further pages
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scraping => "scraping",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a server-side batch or crawl job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub job_id: String,
    /// Expected page count; zero while unknown
    pub total: u64,
    pub completed: u64,
    pub status: JobStatus,
}

impl Job {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            total: 0,
            completed: 0,
            status: JobStatus::Pending,
        }
    }
}

/// One response of the crawl or batch status endpoint
#[derive(Debug, Clone, Default)]
pub struct StatusPage {
    pub status: Option<JobStatus>,
    pub total: u64,
    pub completed: u64,
    pub pages: Vec<FetchOutcome>,
    /// Absolute continuation link for the rest of the result list
    pub next: Option<String>,
}

impl StatusPage {
    pub fn from_value(value: &Value) -> Self {
        Self {
            status: str_field(value, "status").map(|s| JobStatus::parse(&s)),
            total: u64_field(value, "total").unwrap_or(0),
            completed: u64_field(value, "completed").unwrap_or(0),
            pages: documents(value.get("data")),
            next: str_field(value, "next").filter(|s| !s.is_empty()),
        }
    }

    /// Builds a job snapshot; an absent status reads as unknown
    pub fn job(&self, job_id: &str) -> Job {
        Job {
            job_id: job_id.to_string(),
            total: self.total,
            completed: self.completed,
            status: self.status.unwrap_or(JobStatus::Unknown),
        }
    }
}

/// A decoded push-transport message
#[derive(Debug, Clone)]
pub enum PushMessage {
    /// Replay of progress and pages scraped before the connection opened
    Catchup {
        total: Option<u64>,
        completed: Option<u64>,
        status: Option<JobStatus>,
        pages: Vec<FetchOutcome>,
    },
    /// A single newly scraped page
    Document(FetchOutcome),
    Done,
    Error(Option<String>),
    /// Message kinds this client does not handle
    Other(String),
}

impl PushMessage {
    /// Decodes a text frame of the form `{"type": ..., "data": {...}}`
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        let kind = str_field(&value, "type").unwrap_or_default();
        let data = value.get("data").cloned().unwrap_or(Value::Null);

        Ok(match kind.as_str() {
            "catchup" => Self::Catchup {
                total: u64_field(&data, "total"),
                completed: u64_field(&data, "completed"),
                status: str_field(&data, "status").map(|s| JobStatus::parse(&s)),
                pages: documents(data.get("data")),
            },
            "document" => Self::Document(parse_document(&data)),
            "done" => Self::Done,
            "error" => Self::Error(
                str_field(&data, "error").or_else(|| str_field(&value, "error")),
            ),
            _ => Self::Other(kind),
        })
    }
}

/// Converts a crawl or batch document into an outcome
///
/// Crawl pages are discovered by the backend, so the page's own address is
/// `metadata.sourceURL`, falling back to the top-level `url`. Documents with
/// no address at all come back with an empty `url`.
pub fn parse_document(item: &Value) -> FetchOutcome {
    let metadata = item.get("metadata").unwrap_or(&Value::Null);
    let source_url = str_field(metadata, "sourceURL");
    let url = source_url
        .clone()
        .or_else(|| str_field(item, "url"))
        .unwrap_or_default();

    FetchOutcome {
        content: str_field(item, "markdown").unwrap_or_default(),
        http_status: status_field(metadata, "statusCode"),
        error: str_field(metadata, "error"),
        title: str_field(metadata, "title"),
        description: str_field(metadata, "description"),
        source_url,
        ..FetchOutcome::empty(url)
    }
}

/// Converts a single-page scrape response for the requested `url`
pub fn parse_scrape_response(url: &str, body: &Value) -> FetchOutcome {
    if !bool_field(body, "success") {
        let error = str_field(body, "error").unwrap_or_else(|| "Unknown error".to_string());
        return FetchOutcome::failed(url, None, error);
    }

    let data = body.get("data").unwrap_or(&Value::Null);
    let metadata = data.get("metadata").unwrap_or(&Value::Null);

    FetchOutcome {
        content: str_field(data, "markdown").unwrap_or_default(),
        http_status: status_field(metadata, "statusCode"),
        error: str_field(metadata, "error"),
        title: str_field(metadata, "title"),
        description: str_field(metadata, "description"),
        source_url: Some(str_field(metadata, "sourceURL").unwrap_or_else(|| url.to_string())),
        ..FetchOutcome::empty(url)
    }
}

/// Extracts a job id from a start response: `id`, or the last segment of `url`
pub fn job_id_from_response(body: &Value) -> Option<String> {
    str_field(body, "id")
        .filter(|id| !id.is_empty())
        .or_else(|| {
            str_field(body, "url").and_then(|url| {
                url.trim_end_matches('/')
                    .rsplit('/')
                    .next()
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_string)
            })
        })
}

fn documents(value: Option<&Value>) -> Vec<FetchOutcome> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|item| item.is_object())
                .map(parse_document)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

pub(crate) fn bool_field(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn u64_field(value: &Value, key: &str) -> Option<u64> {
    value.get(key).and_then(Value::as_u64)
}

fn status_field(value: &Value, key: &str) -> Option<u16> {
    value
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
}
