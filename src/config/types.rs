use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default address of a locally running backend
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3002";

/// Main configuration structure for Scrape-Keeper
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub scrape: ScrapeConfig,
    pub crawl: CrawlConfig,
    pub output: OutputConfig,
}

/// Backend API connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ApiConfig {
    /// Base URL of the scraping API
    pub url: String,

    /// Timeout for a single HTTP request (seconds)
    pub timeout_secs: u64,

    /// Request-level retries for status, batch and crawl calls
    pub request_retries: u32,

    /// Connect and per-message read timeout for the push transport (seconds)
    pub push_timeout_secs: u64,

    /// Interval between crawl status polls (milliseconds)
    pub poll_interval_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_API_URL.to_string(),
            timeout_secs: 60,
            request_retries: 3,
            push_timeout_secs: 60,
            poll_interval_ms: 2000,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.push_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Sequential and batch scrape settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScrapeConfig {
    /// Upper bound of the random pause between two URLs (seconds)
    pub delay_secs: f64,

    /// Retry attempts per URL for retryable failures
    pub max_retries: u32,

    /// Cap on the exponential backoff between retries (seconds)
    pub max_backoff_secs: f64,

    /// Pause before the end-of-run retry pass (seconds)
    pub retry_cooldown_secs: f64,

    /// Submit all URLs as one batch job instead of fetching sequentially
    pub batch: bool,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            delay_secs: 1.0,
            max_retries: 5,
            max_backoff_secs: 32.0,
            retry_cooldown_secs: 30.0,
            batch: false,
        }
    }
}

impl ScrapeConfig {
    pub fn delay(&self) -> Duration {
        seconds(self.delay_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        seconds(self.max_backoff_secs)
    }

    pub fn retry_cooldown(&self) -> Duration {
        seconds(self.retry_cooldown_secs)
    }
}

/// Site crawl settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlConfig {
    /// Maximum number of pages the backend may crawl
    pub limit: u32,

    /// Maximum link depth from the start URL
    pub max_depth: u32,

    /// Concurrent scrapes on the backend
    pub max_concurrency: u32,

    /// Server-side pause between scrapes (seconds)
    pub delay_secs: f64,

    /// Milliseconds the backend waits for JavaScript rendering
    pub wait_for_ms: u64,

    /// URL path patterns to include
    pub include_paths: Vec<String>,

    /// URL path patterns to exclude
    pub exclude_paths: Vec<String>,

    pub allow_backward_links: bool,
    pub allow_external_links: bool,
    pub allow_subdomains: bool,
    pub ignore_sitemap: bool,
    pub ignore_robots_txt: bool,

    /// Sequential retry attempts for pages that failed during the crawl
    pub max_retries: u32,

    /// Cap on the backoff used by the post-crawl retry pass (seconds)
    pub max_backoff_secs: f64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            limit: 1000,
            max_depth: 10,
            max_concurrency: 1,
            delay_secs: 0.5,
            wait_for_ms: 0,
            include_paths: Vec::new(),
            exclude_paths: Vec::new(),
            allow_backward_links: false,
            allow_external_links: false,
            allow_subdomains: false,
            ignore_sitemap: false,
            ignore_robots_txt: false,
            max_retries: 3,
            max_backoff_secs: 32.0,
        }
    }
}

impl CrawlConfig {
    pub fn max_backoff(&self) -> Duration {
        seconds(self.max_backoff_secs)
    }
}

/// Seconds as a [`Duration`], saturating at the ends; NaN reads as zero
fn seconds(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}

/// Output configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Output directory; derived from the input when absent
    pub dir: Option<PathBuf>,

    /// Prepend YAML front matter to every markdown file
    pub front_matter: bool,

    /// Re-fetch URLs already recorded as successful in the manifest
    pub overwrite: bool,
}
