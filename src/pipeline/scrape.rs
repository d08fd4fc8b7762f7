//! Scrape mode: one URL, a URL list, or a batch job

use super::{log_retries, PageSink, RunSummary};
use crate::client::{ApiClient, BatchPoller, FetchOutcome, PageFetcher};
use crate::config::Config;
use crate::coordinator::{BatchPollCoordinator, JobEvent};
use crate::executor::{ExecutorSettings, ScrapeReport, SequentialScrapeExecutor};
use crate::manifest::pending_urls;
use crate::{KeeperError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Fetches one URL once and writes it; no manifest is kept
pub async fn scrape_single(client: &ApiClient, url: &str, sink: &PageSink) -> Result<RunSummary> {
    info!("Scraping: {}", url);
    let outcome = client.scrape_url(url).await;
    let mut summary = RunSummary::default();

    if !outcome.is_success() {
        error!("Failed: {} ({})", url, outcome.error_summary());
        summary.failed = 1;
        return Ok(summary);
    }

    let path = sink.write(&outcome, None)?;
    info!("Saved: {}", path.display());
    if let Some(title) = &outcome.title {
        debug!("Title: {}", title);
    }

    summary.succeeded = 1;
    Ok(summary)
}

/// Fetches a URL list with resume, retries and the end-of-run retry pass
///
/// URLs whose manifest entry is already `ok` with a 2xx status are skipped
/// unless `output.overwrite` is set. Files are prefixed with the URL's
/// 1-based position among the URLs still to fetch. Retryable failures that
/// never get their second pass because the run was cancelled go to
/// `errors.jsonl`.
pub async fn scrape_list<F>(
    client: &Arc<F>,
    urls: &[String],
    sink: &PageSink,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<RunSummary>
where
    F: PageFetcher + BatchPoller + 'static,
{
    let overwrite = config.output.overwrite;
    let existing = if overwrite {
        HashMap::new()
    } else {
        sink.manifest().load()?
    };
    if !existing.is_empty() {
        debug!("Loaded {} existing entries from manifest", existing.len());
    }

    let (pending, skipped) = pending_urls(urls, &existing, overwrite);
    let mut summary = RunSummary {
        skipped,
        ..Default::default()
    };
    if skipped > 0 {
        info!(
            "Skipping {} already processed URLs (use --overwrite to re-scrape)",
            skipped
        );
    }
    if pending.is_empty() {
        info!("All URLs already processed");
        return Ok(summary);
    }

    if config.scrape.batch {
        scrape_batch(client, &pending, sink, &mut summary, cancel).await?;
        return Ok(summary);
    }

    let executor = SequentialScrapeExecutor::new(
        Arc::clone(client),
        ExecutorSettings::from_scrape_config(&config.scrape),
    )
    .with_retry_hook(log_retries());

    info!("Scraping {} URLs", pending.len());
    let mut retry_later: Vec<(FetchOutcome, usize)> = Vec::new();
    let mut reports = executor.run(pending);
    let mut position = 0;

    while let Some(report) = next_report(&mut reports, cancel).await {
        position += 1;
        summary.retries += u64::from(report.retries_used);

        if report.outcome.is_success() {
            sink.save(&report.outcome, Some(position))?;
            summary.succeeded += 1;
            continue;
        }

        summary.failed += 1;
        let entry = sink.record_failure(&report.outcome)?;
        let reason = entry.error.as_deref().unwrap_or_default();
        if report.permanent {
            summary.permanent += 1;
            sink.manifest().record_error(&entry)?;
            warn!("Permanent error: {} ({})", report.outcome.url, reason);
        } else {
            info!("Will retry: {} ({})", report.outcome.url, reason);
            retry_later.push((report.outcome, position));
        }
    }

    if cancel.is_cancelled() {
        summary.interrupted = true;
        record_unretried(sink, retry_later)?;
        return Ok(summary);
    }
    if retry_later.is_empty() {
        return Ok(summary);
    }

    let cooldown = config.scrape.retry_cooldown();
    info!(
        "Retrying {} failed URLs after {:?} cooldown",
        retry_later.len(),
        cooldown
    );
    let interrupted = tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(cooldown) => false,
    };
    if interrupted {
        summary.interrupted = true;
        record_unretried(sink, retry_later)?;
        return Ok(summary);
    }

    let retry_urls = retry_later
        .iter()
        .map(|(outcome, _)| outcome.url.clone())
        .collect();
    let mut reports = executor.run(retry_urls);
    let mut queued = retry_later.into_iter();
    let (mut recovered, mut still_failed) = (0, 0);

    while let Some(report) = next_report(&mut reports, cancel).await {
        let position = queued.next().map(|(_, position)| position);
        summary.retries += u64::from(report.retries_used);

        if report.outcome.is_success() {
            sink.save(&report.outcome, position)?;
            summary.recovered();
            recovered += 1;
        } else {
            sink.record_error(&report.outcome)?;
            if report.permanent {
                summary.permanent += 1;
            }
            still_failed += 1;
        }
    }

    if cancel.is_cancelled() {
        summary.interrupted = true;
        record_unretried(sink, queued)?;
    }
    info!(
        "Retry results: {} succeeded, {} still failed",
        recovered, still_failed
    );
    Ok(summary)
}

/// Logs failures whose retry pass never ran to `errors.jsonl`
fn record_unretried(
    sink: &PageSink,
    failures: impl IntoIterator<Item = (FetchOutcome, usize)>,
) -> Result<()> {
    for (outcome, _) in failures {
        sink.record_error(&outcome)?;
    }
    Ok(())
}

/// Receives the next report unless the run is cancelled
async fn next_report(
    reports: &mut mpsc::Receiver<ScrapeReport>,
    cancel: &CancellationToken,
) -> Option<ScrapeReport> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        report = reports.recv() => report,
    }
}

/// Submits the URLs as one batch job and saves pages as they arrive
async fn scrape_batch<F>(
    client: &Arc<F>,
    urls: &[String],
    sink: &PageSink,
    summary: &mut RunSummary,
    cancel: &CancellationToken,
) -> Result<()>
where
    F: BatchPoller + 'static,
{
    let job = client.start_batch(urls).await?;
    info!("Started batch job: {}", job.job_id);

    let positions: HashMap<&str, usize> = urls
        .iter()
        .enumerate()
        .map(|(i, url)| (url.as_str(), i + 1))
        .collect();

    let poller: Arc<dyn BatchPoller> = Arc::clone(client) as Arc<dyn BatchPoller>;
    let mut events = BatchPollCoordinator::new(poller).run(job.job_id.clone());

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                summary.interrupted = true;
                return Ok(());
            }
            event = events.recv() => event,
        };

        match event {
            None => return Ok(()),
            Some(JobEvent::Update(update)) => {
                debug!(
                    "Batch {}: {}/{} ({})",
                    update.job.job_id, update.job.completed, update.job.total, update.job.status
                );
                for page in update.pages {
                    let position = positions
                        .get(page.url.as_str())
                        .copied()
                        .unwrap_or(summary.succeeded + summary.failed + 1);

                    if page.is_success() {
                        sink.save(&page, Some(position))?;
                        summary.succeeded += 1;
                    } else {
                        sink.record_failure(&page)?;
                        summary.failed += 1;
                    }
                }
            }
            Some(JobEvent::Degraded(reason)) => warn!("{}", reason),
            Some(JobEvent::Aborted(reason)) => {
                return Err(KeeperError::Api(format!(
                    "batch job {} aborted: {}",
                    job.job_id, reason
                )));
            }
        }
    }
}
