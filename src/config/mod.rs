//! Configuration module for Scrape-Keeper
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section is optional; missing keys fall back to the defaults the
//! backend is known to tolerate.
//!
//! # Example
//!
//! ```no_run
//! use scrape_keeper::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("keeper.toml")).unwrap();
//! println!("Backend API: {}", config.api.url);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{ApiConfig, Config, CrawlConfig, OutputConfig, ScrapeConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate;
