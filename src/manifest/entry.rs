use crate::client::FetchOutcome;
use crate::retry::is_success_status;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Final status of a manifest entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestStatus {
    Ok,
    Error,
}

/// One line of the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub url: String,

    /// Output filename, empty for failures
    #[serde(default)]
    pub file: String,

    pub status: ManifestStatus,

    /// RFC 3339 time the entry was written
    #[serde(default, alias = "timestamp")]
    pub ts: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ManifestEntry {
    /// Entry for a page saved to `file`
    pub fn ok(outcome: &FetchOutcome, file: impl Into<String>) -> Self {
        Self {
            url: outcome.url.clone(),
            file: file.into(),
            status: ManifestStatus::Ok,
            ts: now(),
            title: outcome.title.clone().filter(|t| !t.is_empty()),
            http_status: outcome.http_status,
            error: None,
        }
    }

    /// Entry for a page that could not be saved
    pub fn error(outcome: &FetchOutcome) -> Self {
        Self {
            url: outcome.url.clone(),
            file: String::new(),
            status: ManifestStatus::Error,
            ts: now(),
            title: None,
            http_status: outcome.http_status,
            error: Some(outcome.error_summary()),
        }
    }

    /// True if this URL was saved with a 2xx status and need not be fetched again
    pub fn is_complete(&self) -> bool {
        self.status == ManifestStatus::Ok
            && self.http_status.map(is_success_status).unwrap_or(false)
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
