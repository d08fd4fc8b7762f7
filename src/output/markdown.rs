//! Markdown file writer
//!
//! Each successful page becomes one `.md` file in the output directory,
//! optionally preceded by a YAML front matter block describing where and
//! when it was fetched.

use crate::client::FetchOutcome;
use crate::output::filename::make_filename;
use crate::Result;
use chrono::SecondsFormat;
use std::fs;
use std::path::{Path, PathBuf};

/// How pages are rendered to disk
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownOptions {
    /// Prepend a YAML front matter block
    pub front_matter: bool,
}

/// Renders the YAML front matter block for a page, including delimiters
///
/// `title` is quoted with embedded quotes escaped, `source_url` appears only
/// when it differs from `url`, and `status_code` only when known.
pub fn front_matter(outcome: &FetchOutcome) -> String {
    let mut lines = vec!["---".to_string(), format!("url: {}", outcome.url)];

    if let Some(title) = outcome.title.as_deref().filter(|t| !t.is_empty()) {
        lines.push(format!("title: \"{}\"", title.replace('"', "\\\"")));
    }
    if let Some(source) = outcome.source_url.as_deref() {
        if !source.is_empty() && source != outcome.url {
            lines.push(format!("source_url: {}", source));
        }
    }
    lines.push(format!(
        "scraped_at: {}",
        outcome.fetched_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    if let Some(status) = outcome.http_status {
        lines.push(format!("status_code: {}", status));
    }
    lines.push("---".to_string());
    lines.push(String::new());

    lines.join("\n")
}

/// Writes a page into `output_dir`, creating the directory if needed
///
/// # Arguments
///
/// * `output_dir` - Directory receiving the file
/// * `outcome` - The fetched page
/// * `index` - 1-based position in a URL list, used as filename prefix
/// * `options` - Rendering options
///
/// # Returns
///
/// * `Ok(PathBuf)` - Path of the written file
/// * `Err(KeeperError)` - The directory or file could not be written
pub fn write_markdown(
    output_dir: &Path,
    outcome: &FetchOutcome,
    index: Option<usize>,
    options: MarkdownOptions,
) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;

    let path = output_dir.join(make_filename(&outcome.url, index));
    let body = if options.front_matter {
        format!("{}\n{}", front_matter(outcome), outcome.content)
    } else {
        outcome.content.clone()
    };

    fs::write(&path, body)?;
    Ok(path)
}
