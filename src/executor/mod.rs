//! Sequential scrape executor
//!
//! Fetches a list of URLs strictly one at a time through the backend's
//! single-page scrape. Each URL is fully resolved (success, permanent failure
//! or exhausted retries) before the next one starts, so the backend never
//! sees more than one request from this executor at a time.
//!
//! Results are produced lazily on a channel, one [`ScrapeReport`] per input
//! URL, in input order. A run is not restartable; the end-of-run retry pass
//! is simply a second [`SequentialScrapeExecutor::run`] call.

use crate::client::{FetchOutcome, PageFetcher};
use crate::config::ScrapeConfig;
use crate::retry::{backoff_delay, classify, Classification, BASE_BACKOFF};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Callback invoked before each retry with `(url, retry_number, http_status)`
pub type RetryHook = Arc<dyn Fn(&str, u32, Option<u16>) + Send + Sync>;

/// Retry and pacing settings for one executor run
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Upper bound of the random pause between two URLs; zero disables it
    pub politeness_delay_max: Duration,

    /// Retries per URL after the first attempt
    pub max_retries: u32,

    /// Cap on the exponential backoff
    pub max_backoff: Duration,
}

impl ExecutorSettings {
    pub fn from_scrape_config(config: &ScrapeConfig) -> Self {
        Self {
            politeness_delay_max: config.delay(),
            max_retries: config.max_retries,
            max_backoff: config.max_backoff(),
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from_scrape_config(&ScrapeConfig::default())
    }
}

/// Terminal result for one URL
#[derive(Debug, Clone)]
pub struct ScrapeReport {
    pub outcome: FetchOutcome,

    /// The failure will not go away on retry
    pub permanent: bool,

    /// Retries spent on this URL (0 = resolved on the first attempt)
    pub retries_used: u32,
}

impl ScrapeReport {
    /// Failed, but worth another try later
    pub fn is_retryable_failure(&self) -> bool {
        !self.outcome.is_success() && !self.permanent
    }
}

/// Drives URLs one at a time through a [`PageFetcher`]
pub struct SequentialScrapeExecutor<F: ?Sized> {
    fetcher: Arc<F>,
    settings: ExecutorSettings,
    on_retry: Option<RetryHook>,
}

impl<F> SequentialScrapeExecutor<F>
where
    F: PageFetcher + ?Sized + 'static,
{
    pub fn new(fetcher: Arc<F>, settings: ExecutorSettings) -> Self {
        Self {
            fetcher,
            settings,
            on_retry: None,
        }
    }

    /// Registers a callback invoked before every retry
    pub fn with_retry_hook(mut self, hook: RetryHook) -> Self {
        self.on_retry = Some(hook);
        self
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Starts fetching `urls` and returns the stream of reports
    ///
    /// The producer runs on its own task and stops early if the receiver is
    /// dropped. An empty list yields a stream that ends immediately.
    pub fn run(&self, urls: Vec<String>) -> mpsc::Receiver<ScrapeReport> {
        let (tx, rx) = mpsc::channel(1);
        let fetcher = Arc::clone(&self.fetcher);
        let settings = self.settings.clone();
        let on_retry = self.on_retry.clone();

        tokio::spawn(async move {
            let last = urls.len().saturating_sub(1);
            for (index, url) in urls.into_iter().enumerate() {
                let report =
                    scrape_with_retries(&*fetcher, &url, &settings, on_retry.as_deref()).await;

                if tx.send(report).await.is_err() {
                    tracing::debug!("Scrape report receiver dropped, stopping executor");
                    return;
                }

                if index < last {
                    let pause = politeness_delay(settings.politeness_delay_max);
                    if !pause.is_zero() {
                        tokio::time::sleep(pause).await;
                    }
                }
            }
        });

        rx
    }
}

/// Fetches one URL until it succeeds, fails permanently or runs out of retries
pub async fn scrape_with_retries<F>(
    fetcher: &F,
    url: &str,
    settings: &ExecutorSettings,
    on_retry: Option<&(dyn Fn(&str, u32, Option<u16>) + Send + Sync)>,
) -> ScrapeReport
where
    F: PageFetcher + ?Sized,
{
    let mut attempt = 0;

    loop {
        let mut outcome = fetcher.fetch_page(url).await;
        if outcome.url != url {
            outcome.url = url.to_string();
        }

        if outcome.is_success() {
            return ScrapeReport {
                outcome,
                permanent: false,
                retries_used: attempt,
            };
        }

        if classify(outcome.http_status) == Classification::Permanent {
            tracing::debug!(
                "Permanent failure for {}: {}",
                url,
                outcome.error_summary()
            );
            return ScrapeReport {
                outcome,
                permanent: true,
                retries_used: attempt,
            };
        }

        if attempt >= settings.max_retries {
            tracing::warn!(
                "Giving up on {} after {} retries: {}",
                url,
                attempt,
                outcome.error_summary()
            );
            return ScrapeReport {
                outcome,
                permanent: false,
                retries_used: attempt,
            };
        }

        if let Some(hook) = on_retry {
            hook(url, attempt + 1, outcome.http_status);
        }

        let delay = backoff_delay(attempt, BASE_BACKOFF, settings.max_backoff);
        tracing::debug!(
            "Retry {} for {} in {:?} ({})",
            attempt + 1,
            url,
            delay,
            outcome.error_summary()
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Uniformly random pause in `[0, max]`
fn politeness_delay(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let secs = rand::thread_rng().gen_range(0.0..=max.as_secs_f64());
    Duration::try_from_secs_f64(secs).unwrap_or(max)
}
