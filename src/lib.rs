//! Scrape-Keeper: a resumable page fetcher for a remote scraping API
//!
//! This crate drives a remote scraping backend (single-page scrape, batch
//! scrape and site crawl endpoints) and persists every result as a markdown
//! file plus an append-only manifest, tolerating rate limits, transient
//! failures, duplicate delivery and process restarts.

pub mod client;
pub mod config;
pub mod coordinator;
pub mod executor;
pub mod input;
pub mod manifest;
pub mod output;
pub mod pipeline;
pub mod retry;

use thiserror::Error;

/// Main error type for Scrape-Keeper operations
#[derive(Debug, Error)]
pub enum KeeperError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP {status} from {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Backend rejected request: {0}")]
    Api(String),

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("Push transport closed before the job finished")]
    PushClosed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Input error: {0}")]
    Input(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Scrape-Keeper operations
pub type Result<T> = std::result::Result<T, KeeperError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use client::{ApiClient, FetchOutcome, Job, JobStatus};
pub use config::Config;
pub use manifest::{ManifestEntry, ManifestStatus};
pub use retry::{backoff_delay, classify, Classification};
