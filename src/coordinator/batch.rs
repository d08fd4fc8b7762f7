//! Batch job coordinator

use super::{DedupSet, JobEvent, JobUpdate};
use crate::client::BatchPoller;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error};

/// Interval between batch status polls
pub const BATCH_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Polls a batch job until it reaches a terminal status
pub struct BatchPollCoordinator {
    poller: Arc<dyn BatchPoller>,
}

impl BatchPollCoordinator {
    pub fn new(poller: Arc<dyn BatchPoller>) -> Self {
        Self { poller }
    }

    /// Starts following `job_id`; each poll yields one [`JobEvent::Update`]
    pub fn run(&self, job_id: impl Into<String>) -> mpsc::Receiver<JobEvent> {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(poll_batch(Arc::clone(&self.poller), job_id.into(), tx));
        rx
    }
}

async fn poll_batch(poller: Arc<dyn BatchPoller>, job_id: String, tx: mpsc::Sender<JobEvent>) {
    let mut seen = DedupSet::new();
    loop {
        let page = match poller.batch_status(&job_id).await {
            Ok(page) => page,
            Err(e) => {
                error!(job_id = %job_id, "Batch status polling failed: {}", e);
                let _ = tx.send(JobEvent::Aborted(e.to_string())).await;
                return;
            }
        };

        let job = page.job(&job_id);
        let terminal = job.status.is_terminal();
        let pages = seen.admit(page.pages);
        debug!(
            job_id = %job_id,
            status = %job.status,
            completed = job.completed,
            total = job.total,
            new_pages = pages.len(),
            "Batch status"
        );

        if tx.send(JobEvent::Update(JobUpdate { job, pages })).await.is_err() || terminal {
            return;
        }
        sleep(BATCH_POLL_INTERVAL).await;
    }
}
