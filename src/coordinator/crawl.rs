//! Crawl job coordinator with push-to-poll fallback

use super::{DedupSet, JobEvent, JobUpdate};
use crate::client::{
    CrawlPoller, FetchOutcome, Job, JobStatus, PushMessage, PushSession, PushTransport,
};
use crate::Result;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default interval between crawl status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Upper bound on the out-of-band cancel request
const CANCEL_TIMEOUT: Duration = Duration::from_secs(5);

/// Follows one crawl job to completion
///
/// The push transport is tried first. If it cannot be opened, or breaks
/// before the backend reports `done` or `error`, the run continues by
/// polling the status endpoint. Pages seen over either transport are
/// emitted at most once.
pub struct StreamingCrawlCoordinator {
    poller: Arc<dyn CrawlPoller>,
    push: Option<Arc<dyn PushTransport>>,
    poll_interval: Duration,
}

impl StreamingCrawlCoordinator {
    /// Creates a coordinator; without a push transport it polls from the start
    pub fn new(poller: Arc<dyn CrawlPoller>, push: Option<Arc<dyn PushTransport>>) -> Self {
        Self {
            poller,
            push,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Starts following `job_id` and returns the event stream
    ///
    /// The stream ends after a terminal event: an update whose job status is
    /// terminal, or [`JobEvent::Aborted`]. Cancelling `cancel` sends a
    /// best-effort cancel request to the backend and ends the stream with a
    /// `cancelled` snapshot.
    pub fn run(
        &self,
        job_id: impl Into<String>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<JobEvent> {
        let (tx, rx) = mpsc::channel(1);

        let mut job = Job::new(job_id);
        job.status = JobStatus::Scraping;

        let run = CrawlRun {
            job,
            seen: DedupSet::new(),
            tx,
            poller: Arc::clone(&self.poller),
            push: self.push.clone(),
            poll_interval: self.poll_interval,
            cancel,
        };
        tokio::spawn(run.drive());

        rx
    }
}

enum Phase {
    Connecting,
    Streaming(Box<dyn PushSession>),
    Polling,
    Done,
}

/// State of one coordinator run, owned by its task
struct CrawlRun {
    job: Job,
    seen: DedupSet,
    tx: mpsc::Sender<JobEvent>,
    poller: Arc<dyn CrawlPoller>,
    push: Option<Arc<dyn PushTransport>>,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl CrawlRun {
    async fn drive(mut self) {
        let mut phase = Phase::Connecting;
        loop {
            phase = match phase {
                Phase::Connecting => self.connect().await,
                Phase::Streaming(session) => self.stream(session).await,
                Phase::Polling => self.poll().await,
                Phase::Done => break,
            };
        }
        debug!(
            job_id = %self.job.job_id,
            status = %self.job.status,
            pages = self.seen.len(),
            "Crawl coordinator finished"
        );
    }

    async fn connect(&mut self) -> Phase {
        let Some(push) = self.push.clone() else {
            return Phase::Polling;
        };

        let cancel = self.cancel.clone();
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = push.open(&self.job.job_id) => Some(result),
        };

        match opened {
            None => self.cancelled().await,
            Some(Ok(session)) => {
                debug!(job_id = %self.job.job_id, "Push transport connected");
                Phase::Streaming(session)
            }
            Some(Err(e)) => self.degrade(format!("push transport unavailable: {}", e)).await,
        }
    }

    async fn stream(&mut self, mut session: Box<dyn PushSession>) -> Phase {
        let cancel = self.cancel.clone();
        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                message = session.next_message() => Some(message),
            };

            let message = match read {
                None => {
                    session.close().await;
                    return self.cancelled().await;
                }
                Some(Ok(Some(message))) => message,
                Some(Ok(None)) => {
                    return self
                        .degrade("push transport closed before the crawl finished".to_string())
                        .await;
                }
                Some(Err(e)) => {
                    session.close().await;
                    return self.degrade(format!("push transport failed: {}", e)).await;
                }
            };

            match message {
                PushMessage::Catchup {
                    total,
                    completed,
                    status,
                    pages,
                } => {
                    if let Some(total) = total {
                        self.job.total = total;
                    }
                    if let Some(completed) = completed {
                        self.job.completed = completed;
                    }
                    if let Some(status) = status {
                        self.job.status = status;
                    }
                    let pages = self.seen.admit(pages);
                    debug!(new_pages = pages.len(), "Catch-up received");
                    if !self.emit(pages).await {
                        return Phase::Done;
                    }
                }
                PushMessage::Document(page) => {
                    self.job.completed = self.job.completed.saturating_add(1);
                    let pages = self.seen.admit(vec![page]);
                    if !self.emit(pages).await {
                        return Phase::Done;
                    }
                }
                PushMessage::Done => {
                    self.job.status = JobStatus::Completed;
                    session.close().await;
                    let _ = self.emit(Vec::new()).await;
                    return Phase::Done;
                }
                PushMessage::Error(reason) => {
                    warn!(
                        job_id = %self.job.job_id,
                        "Crawl failed on the backend: {}",
                        reason.as_deref().unwrap_or("no reason given")
                    );
                    self.job.status = JobStatus::Failed;
                    session.close().await;
                    let _ = self.emit(Vec::new()).await;
                    return Phase::Done;
                }
                PushMessage::Other(kind) => {
                    debug!(kind = %kind, "Ignoring push message");
                }
            }
        }
    }

    async fn poll(&mut self) -> Phase {
        let cancel = self.cancel.clone();
        loop {
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.poll_cycle() => Some(result),
            };

            let (job, pages) = match fetched {
                None => return self.cancelled().await,
                Some(Ok(cycle)) => cycle,
                Some(Err(e)) => {
                    error!(job_id = %self.job.job_id, "Crawl status polling failed: {}", e);
                    let _ = self.tx.send(JobEvent::Aborted(e.to_string())).await;
                    return Phase::Done;
                }
            };

            self.job = job;
            if !self.emit(pages).await || self.job.status.is_terminal() {
                return Phase::Done;
            }

            let waited = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                _ = sleep(self.poll_interval) => true,
            };
            if !waited {
                return self.cancelled().await;
            }
        }
    }

    /// Fetches the status and every continuation page, returning the new pages
    async fn poll_cycle(&mut self) -> Result<(Job, Vec<FetchOutcome>)> {
        let first = self.poller.crawl_status(&self.job.job_id).await?;
        let job = first.job(&self.job.job_id);
        let mut pages = self.seen.admit(first.pages);

        let mut next = first.next;
        let mut followed = HashSet::new();
        while let Some(link) = next.take() {
            if !followed.insert(link.clone()) {
                warn!("Continuation link repeated, stopping pagination: {}", link);
                break;
            }
            match self.poller.crawl_status_next(&link).await {
                Ok(page) => {
                    pages.extend(self.seen.admit(page.pages));
                    next = page.next;
                }
                Err(e) => {
                    warn!("Stopping pagination at {}: {}", link, e);
                    break;
                }
            }
        }

        Ok((job, pages))
    }

    async fn cancelled(&mut self) -> Phase {
        info!(job_id = %self.job.job_id, "Cancelling crawl job");
        match timeout(CANCEL_TIMEOUT, self.poller.cancel_crawl(&self.job.job_id)).await {
            Ok(Ok(())) => debug!("Backend accepted the cancel request"),
            Ok(Err(e)) => debug!("Cancel request failed (ignored): {}", e),
            Err(_) => debug!("Cancel request timed out (ignored)"),
        }
        self.job.status = JobStatus::Cancelled;
        let _ = self.emit(Vec::new()).await;
        Phase::Done
    }

    async fn degrade(&self, reason: String) -> Phase {
        warn!(job_id = %self.job.job_id, "{}; falling back to polling", reason);
        match self.tx.send(JobEvent::Degraded(reason)).await {
            Ok(()) => Phase::Polling,
            Err(_) => Phase::Done,
        }
    }

    /// Sends a snapshot with `pages`; false once the receiver is gone
    async fn emit(&self, pages: Vec<FetchOutcome>) -> bool {
        let update = JobUpdate {
            job: self.job.clone(),
            pages,
        };
        self.tx.send(JobEvent::Update(update)).await.is_ok()
    }
}
