//! Filename derivation for saved pages

use sha2::{Digest, Sha256};
use url::Url;

/// Maximum length of the host part of a filename
const HOST_MAX_LEN: usize = 30;

/// Maximum length of the path part of a filename
const PATH_MAX_LEN: usize = 40;

/// Number of hex characters of the URL hash kept in a filename
const HASH_LEN: usize = 10;

/// Reduces text to characters that are safe in a filename
///
/// Path separators become `_`, anything outside `[A-Za-z0-9._-]` is
/// dropped, runs of `_` and `-` collapse to a single `_`, leading and
/// trailing `_`, `-` and `.` are trimmed, and the result is truncated to
/// `max_len` characters.
pub fn sanitize_for_filename(text: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_run = false;

    for c in text.chars() {
        let c = if c == '/' || c == '\\' { '_' } else { c };
        if c == '_' || c == '-' {
            if !in_run {
                out.push('_');
                in_run = true;
            }
        } else if c.is_ascii_alphanumeric() || c == '.' {
            out.push(c);
            in_run = false;
        }
    }

    out.trim_matches(|c| c == '_' || c == '-' || c == '.')
        .chars()
        .take(max_len)
        .collect()
}

/// First ten hex characters of the SHA-256 digest of `url`
pub fn url_hash(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(HASH_LEN);
    hash
}

/// Builds the filename for a page
///
/// The scheme is `{index:04}_{host}_{path}__{hash}.md`; the index part is
/// present only when `index` is given, an empty path reads as `index` and
/// a path equal to the host is left out. The hash keeps distinct URLs that
/// sanitize to the same text apart.
///
/// # Examples
///
/// ```
/// use scrape_keeper::output::make_filename;
///
/// let name = make_filename("https://example.com/docs/intro", Some(3));
/// assert!(name.starts_with("0003_example.com_docs_intro__"));
/// assert!(name.ends_with(".md"));
/// ```
pub fn make_filename(url: &str, index: Option<usize>) -> String {
    let (host, path) = match Url::parse(url) {
        Ok(parsed) => {
            let host = match (parsed.host_str(), parsed.port()) {
                (Some(host), Some(port)) => format!("{}:{}", host, port),
                (Some(host), None) => host.to_string(),
                (None, _) => String::new(),
            };
            (host, parsed.path().to_string())
        }
        Err(_) => (String::new(), url.to_string()),
    };

    let host = if host.is_empty() { "unknown" } else { host.as_str() };
    let host = sanitize_for_filename(host, HOST_MAX_LEN);

    let path = path.trim_matches('/');
    let path_slug = if path.is_empty() {
        "index".to_string()
    } else {
        sanitize_for_filename(path, PATH_MAX_LEN)
    };

    let mut parts = Vec::with_capacity(3);
    if let Some(index) = index {
        parts.push(format!("{:04}", index));
    }
    if !path_slug.is_empty() && path_slug != host {
        parts.push(host);
        parts.push(path_slug);
    } else {
        parts.push(host);
    }

    format!("{}__{}.md", parts.join("_"), url_hash(url))
}
