//! Output module for writing fetched pages to disk
//!
//! This module handles:
//! - Deriving stable, collision-resistant filenames from URLs
//! - Rendering optional YAML front matter
//! - Writing one markdown file per successfully fetched page

mod filename;
mod markdown;

pub use filename::{make_filename, sanitize_for_filename, url_hash};
pub use markdown::{front_matter, write_markdown, MarkdownOptions};
