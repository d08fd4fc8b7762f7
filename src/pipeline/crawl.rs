//! Crawl mode: follow a crawl job, save pages, retry failures

use super::{log_retries, PageSink, RunSummary};
use crate::client::{
    ApiClient, CrawlPoller, CrawlRequest, FetchOutcome, JobStatus, PageFetcher, PushTransport,
    WsTransport,
};
use crate::config::Config;
use crate::coordinator::{JobEvent, StreamingCrawlCoordinator};
use crate::executor::{ExecutorSettings, SequentialScrapeExecutor};
use crate::manifest::ManifestEntry;
use crate::{KeeperError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Politeness delay of the post-crawl retry pass
pub const CRAWL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Runs a crawl job to completion and saves every page it delivers
///
/// Pages already saved successfully in an earlier run are skipped unless
/// `output.overwrite` is set. Failed pages are fetched again one by one
/// after the crawl ends; pages that still fail go to `errors.jsonl`.
/// Cancelling `cancel` cancels the job on the backend and skips the retry
/// pass.
pub async fn crawl_site(
    client: &Arc<ApiClient>,
    request: &CrawlRequest,
    sink: &PageSink,
    config: &Config,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let overwrite = config.output.overwrite;
    let existing = if overwrite {
        HashMap::new()
    } else {
        sink.manifest().load()?
    };
    if !existing.is_empty() {
        debug!("Loaded {} entries from manifest", existing.len());
    }

    let job = client.start_crawl(request).await?;
    info!("Started crawl: {}", job.job_id);

    let push: Arc<dyn PushTransport> = Arc::new(WsTransport::new(
        client.ws_base_url(),
        config.api.push_timeout(),
    ));
    let poller: Arc<dyn CrawlPoller> = Arc::clone(client) as Arc<dyn CrawlPoller>;
    let coordinator = StreamingCrawlCoordinator::new(poller, Some(push))
        .with_poll_interval(config.api.poll_interval());

    let mut summary = RunSummary::default();
    let mut failed_pages = Vec::new();
    let mut events = coordinator.run(job.job_id.clone(), cancel.clone());

    while let Some(event) = events.recv().await {
        let update = match event {
            JobEvent::Update(update) => update,
            JobEvent::Degraded(reason) => {
                debug!("Continuing by polling: {}", reason);
                continue;
            }
            JobEvent::Aborted(reason) => {
                return Err(KeeperError::Api(format!(
                    "crawl {} aborted: {}",
                    job.job_id, reason
                )));
            }
        };

        debug!(
            "Crawling... {}/{} ({} ok, {} err)",
            update.job.completed,
            if update.job.total > 0 {
                update.job.total.to_string()
            } else {
                "?".to_string()
            },
            summary.succeeded,
            summary.failed
        );

        for page in update.pages {
            let already_saved = existing
                .get(&page.url)
                .map(ManifestEntry::is_complete)
                .unwrap_or(false);
            if !overwrite && already_saved {
                summary.skipped += 1;
                continue;
            }

            if page.is_success() {
                sink.save(&page, None)?;
                summary.succeeded += 1;
                info!("OK: {}", page.url);
            } else {
                let entry = sink.record_failure(&page)?;
                summary.failed += 1;
                warn!(
                    "Fail: {} ({})",
                    page.url,
                    entry.error.as_deref().unwrap_or_default()
                );
                failed_pages.push(page);
            }
        }

        match update.job.status {
            JobStatus::Failed => warn!("Crawl {} failed on the backend", job.job_id),
            JobStatus::Cancelled => summary.interrupted = cancel.is_cancelled(),
            _ => {}
        }
    }

    retry_failed_pages(client, failed_pages, sink, config, &cancel, &mut summary).await?;
    Ok(summary)
}

/// Fetches failed crawl pages again, one by one, through the sequential executor
///
/// Pages recovered here are saved; pages that still fail, or that were not
/// retried because retries are disabled or the run was cancelled, go to
/// `errors.jsonl`.
async fn retry_failed_pages<F>(
    fetcher: &Arc<F>,
    failed_pages: Vec<FetchOutcome>,
    sink: &PageSink,
    config: &Config,
    cancel: &CancellationToken,
    summary: &mut RunSummary,
) -> Result<()>
where
    F: PageFetcher + ?Sized + 'static,
{
    if failed_pages.is_empty() {
        return Ok(());
    }
    if summary.interrupted || config.crawl.max_retries == 0 {
        for page in &failed_pages {
            sink.record_error(page)?;
        }
        return Ok(());
    }

    info!("Retrying {} failed URLs sequentially", failed_pages.len());
    let settings = ExecutorSettings {
        politeness_delay_max: CRAWL_RETRY_DELAY,
        max_retries: config.crawl.max_retries,
        max_backoff: config.crawl.max_backoff(),
    };
    let executor =
        SequentialScrapeExecutor::new(Arc::clone(fetcher), settings).with_retry_hook(log_retries());

    let mut reports = executor.run(failed_pages.iter().map(|page| page.url.clone()).collect());
    let mut queued = failed_pages.into_iter();
    let mut recovered = 0;
    loop {
        let report = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                summary.interrupted = true;
                break;
            }
            report = reports.recv() => report,
        };
        let Some(report) = report else { break };
        queued.next();

        summary.retries += u64::from(report.retries_used);
        if report.outcome.is_success() {
            sink.save(&report.outcome, None)?;
            summary.recovered();
            recovered += 1;
            info!("Retry OK: {}", report.outcome.url);
        } else {
            let entry = sink.record_error(&report.outcome)?;
            if report.permanent {
                summary.permanent += 1;
            }
            warn!(
                "Still failed: {} ({})",
                report.outcome.url,
                entry.error.as_deref().unwrap_or_default()
            );
        }
    }

    for page in queued {
        sink.record_error(&page)?;
    }
    info!(
        "Retry: {} recovered, {} still failed",
        recovered, summary.failed
    );
    Ok(())
}
