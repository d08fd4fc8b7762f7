//! Command-line input handling
//!
//! An input is either a single URL or a file listing URLs one per line.
//! This module tells the two apart, reads URL files and picks the default
//! output directory for each kind of input.

use crate::{KeeperError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Returns true if `text` looks like an http(s) URL
pub fn is_url(text: &str) -> bool {
    let text = text.trim().as_bytes();
    ["http://", "https://"].iter().any(|scheme| {
        text.len() >= scheme.len() && text[..scheme.len()].eq_ignore_ascii_case(scheme.as_bytes())
    })
}

/// Reads a URL list; blank lines and `#` comments are skipped
pub fn parse_url_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| {
        KeeperError::Input(format!("cannot read URL file {}: {}", path.display(), e))
    })?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Resolves the output directory for a scrape input
///
/// An explicit directory wins. A URL input writes into `cwd`, a URL file
/// into `cwd/<file stem>`.
pub fn default_output_dir(input: &str, explicit: Option<&Path>, cwd: &Path) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if is_url(input) {
        return cwd.to_path_buf();
    }

    match Path::new(input).file_stem() {
        Some(stem) => cwd.join(stem),
        None => cwd.to_path_buf(),
    }
}

/// Resolves the output directory for a crawl: `cwd/<host>` unless explicit
pub fn crawl_output_dir(start_url: &str, explicit: Option<&Path>, cwd: &Path) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }

    let parsed = Url::parse(start_url.trim())?;
    let host = parsed
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| KeeperError::Input(format!("URL has no host: {}", start_url)))?;

    Ok(cwd.join(host))
}
