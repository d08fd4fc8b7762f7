use crate::manifest::entry::{ManifestEntry, ManifestStatus};
use crate::Result;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Manifest filename inside the output directory
pub const MANIFEST_FILE: &str = "manifest.jsonl";

/// Error log filename inside the output directory
pub const ERRORS_FILE: &str = "errors.jsonl";

/// The manifest and error log of one output directory
#[derive(Debug, Clone)]
pub struct ResultManifest {
    manifest_path: PathBuf,
    errors_path: PathBuf,
}

impl ResultManifest {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            manifest_path: output_dir.join(MANIFEST_FILE),
            errors_path: output_dir.join(ERRORS_FILE),
        }
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn errors_path(&self) -> &Path {
        &self.errors_path
    }

    /// Loads the URL → last entry mapping
    pub fn load(&self) -> Result<HashMap<String, ManifestEntry>> {
        load_manifest(&self.manifest_path)
    }

    /// Appends an entry to `manifest.jsonl`
    pub fn record(&self, entry: &ManifestEntry) -> Result<()> {
        append_line(&self.manifest_path, entry)
    }

    /// Appends a failed entry to `errors.jsonl`; successful entries are ignored
    pub fn record_error(&self, entry: &ManifestEntry) -> Result<()> {
        if entry.status != ManifestStatus::Error {
            return Ok(());
        }
        append_line(&self.errors_path, entry)
    }
}

/// Loads a manifest file into a URL → entry map
///
/// A missing file yields an empty map. Blank and unparseable lines are
/// skipped. When a URL appears several times the last line wins.
pub fn load_manifest(path: &Path) -> Result<HashMap<String, ManifestEntry>> {
    let mut entries = HashMap::new();

    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
        Err(e) => return Err(e.into()),
    };

    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<ManifestEntry>(line) {
            Ok(entry) => {
                entries.insert(entry.url.clone(), entry);
            }
            Err(e) => {
                tracing::warn!(
                    "Skipping invalid manifest line {} in {}: {}",
                    line_no + 1,
                    path.display(),
                    e
                );
            }
        }
    }

    tracing::debug!("Loaded {} manifest entries from {}", entries.len(), path.display());
    Ok(entries)
}

/// Filters out URLs already saved successfully
///
/// Returns the URLs still to fetch, in input order, and the number skipped.
/// With `overwrite` nothing is skipped.
pub fn pending_urls(
    urls: &[String],
    existing: &HashMap<String, ManifestEntry>,
    overwrite: bool,
) -> (Vec<String>, usize) {
    if overwrite {
        return (urls.to_vec(), 0);
    }

    let pending: Vec<String> = urls
        .iter()
        .filter(|url| !existing.get(*url).map(ManifestEntry::is_complete).unwrap_or(false))
        .cloned()
        .collect();
    let skipped = urls.len() - pending.len();
    (pending, skipped)
}

fn append_line(path: &Path, entry: &ManifestEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut line = serde_json::to_string(entry)?;
    line.push('\n');

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}
