//! Run orchestration for the command-line modes
//!
//! A pipeline wires the executor or a coordinator to the output directory:
//! every page that arrives is written as markdown, every outcome lands in
//! the manifest, and failures go through the end-of-run retry pass. The
//! returned [`RunSummary`] decides the process exit status.

mod crawl;
mod scrape;

pub use crawl::{crawl_site, CRAWL_RETRY_DELAY};
pub use scrape::{scrape_list, scrape_single};

use crate::client::FetchOutcome;
use crate::executor::RetryHook;
use crate::manifest::{ManifestEntry, ResultManifest};
use crate::output::{write_markdown, MarkdownOptions};
use crate::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Counters of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Failures classified as permanent (subset of `failed`)
    pub permanent: usize,
    /// URLs skipped because the manifest already holds a successful entry
    pub skipped: usize,
    /// Retries spent across all URLs
    pub retries: u64,
    /// The run stopped early on user request
    pub interrupted: bool,
}

impl RunSummary {
    /// Process exit status: 0 without failures, 2 if nothing succeeded, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        match (self.failed, self.succeeded) {
            (0, _) => 0,
            (_, 0) => 2,
            _ => 1,
        }
    }

    /// Moves one failure over to the success column
    fn recovered(&mut self) {
        self.succeeded += 1;
        self.failed = self.failed.saturating_sub(1);
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} saved", self.succeeded)?;
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
            if self.permanent > 0 {
                write!(f, " ({} permanent)", self.permanent)?;
            }
        }
        if self.skipped > 0 {
            write!(f, ", {} skipped (resume)", self.skipped)?;
        }
        if self.interrupted {
            write!(f, ", interrupted")?;
        }
        Ok(())
    }
}

/// Writes pages and manifest entries into one output directory
#[derive(Debug, Clone)]
pub struct PageSink {
    dir: PathBuf,
    manifest: ResultManifest,
    options: MarkdownOptions,
}

impl PageSink {
    pub fn new(dir: impl Into<PathBuf>, options: MarkdownOptions) -> Self {
        let dir = dir.into();
        Self {
            manifest: ResultManifest::new(&dir),
            dir,
            options,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest(&self) -> &ResultManifest {
        &self.manifest
    }

    /// Writes the page's markdown file without touching the manifest
    pub fn write(&self, outcome: &FetchOutcome, index: Option<usize>) -> Result<PathBuf> {
        write_markdown(&self.dir, outcome, index, self.options)
    }

    /// Writes the page and appends an `ok` manifest entry
    pub fn save(&self, outcome: &FetchOutcome, index: Option<usize>) -> Result<ManifestEntry> {
        let path = self.write(outcome, index)?;
        let file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let entry = ManifestEntry::ok(outcome, file);
        self.manifest.record(&entry)?;
        Ok(entry)
    }

    /// Appends an `error` manifest entry
    pub fn record_failure(&self, outcome: &FetchOutcome) -> Result<ManifestEntry> {
        let entry = ManifestEntry::error(outcome);
        self.manifest.record(&entry)?;
        Ok(entry)
    }

    /// Appends an `error` entry to the error log only
    pub fn record_error(&self, outcome: &FetchOutcome) -> Result<ManifestEntry> {
        let entry = ManifestEntry::error(outcome);
        self.manifest.record_error(&entry)?;
        Ok(entry)
    }
}

/// Retry hook that logs each retry
pub(crate) fn log_retries() -> RetryHook {
    Arc::new(|url: &str, attempt: u32, status: Option<u16>| match status {
        Some(status) => tracing::info!("Retry {}: {} (HTTP {})", attempt, url, status),
        None => tracing::info!("Retry {}: {} (no response)", attempt, url),
    })
}
