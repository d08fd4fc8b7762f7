//! Append-only result manifest
//!
//! Every per-URL outcome is appended to `<output-dir>/manifest.jsonl` as one
//! JSON object per line. Failed entries that are not going to be retried are
//! also appended to `<output-dir>/errors.jsonl`. Nothing is ever rewritten:
//! on load, the last line written for a URL wins, which is what makes a
//! resumed run supersede an earlier attempt.

mod entry;
mod store;

pub use entry::{ManifestEntry, ManifestStatus};
pub use store::{load_manifest, pending_urls, ResultManifest, ERRORS_FILE, MANIFEST_FILE};
