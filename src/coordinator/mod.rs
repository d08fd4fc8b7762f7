//! Job coordinators for crawl and batch jobs
//!
//! A coordinator follows one server-side job until it reaches a terminal
//! status and turns whatever the backend delivers into a single stream of
//! [`JobEvent`]s:
//! - [`StreamingCrawlCoordinator`] prefers the push transport and falls back
//!   to polling when it breaks
//! - [`BatchPollCoordinator`] only polls
//!
//! Both transports may deliver the same page more than once (catch-up
//! replay, overlapping poll responses). Each coordinator run owns one
//! [`DedupSet`], so a page URL is emitted at most once per run.

mod batch;
mod crawl;

pub use batch::{BatchPollCoordinator, BATCH_POLL_INTERVAL};
pub use crawl::{StreamingCrawlCoordinator, DEFAULT_POLL_INTERVAL};

use crate::client::{FetchOutcome, Job};
use std::collections::HashSet;

/// Progress of a job plus the pages that are new since the previous update
#[derive(Debug, Clone)]
pub struct JobUpdate {
    pub job: Job,
    pub pages: Vec<FetchOutcome>,
}

/// An item of a coordinator's output stream
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// Job snapshot and newly delivered pages
    Update(JobUpdate),

    /// The push transport is unusable; the run continues by polling
    Degraded(String),

    /// The job can no longer be followed (status polling failed for good)
    Aborted(String),
}

impl JobEvent {
    /// Returns true if the event reports a finished or unfollowable job
    ///
    /// This is not an end-of-stream marker: a push catch-up may already carry
    /// a finished status and still be followed by the closing update. The
    /// stream ends when the channel closes.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Update(update) => update.job.status.is_terminal(),
            Self::Degraded(_) => false,
            Self::Aborted(_) => true,
        }
    }
}

/// URLs already emitted during one coordinator run
#[derive(Debug, Default)]
pub struct DedupSet {
    seen: HashSet<String>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps only pages whose URL is non-empty and not yet seen, and marks them seen
    pub fn admit(&mut self, pages: Vec<FetchOutcome>) -> Vec<FetchOutcome> {
        pages
            .into_iter()
            .filter(|page| !page.url.is_empty() && self.seen.insert(page.url.clone()))
            .collect()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
