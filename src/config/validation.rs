use crate::config::types::{ApiConfig, Config, CrawlConfig, ScrapeConfig};
use crate::ConfigError;
use std::time::Duration;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_scrape_config(&config.scrape)?;
    validate_crawl_config(&config.crawl)?;
    Ok(())
}

/// Validates backend API settings
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid api url '{}': {}", config.url, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "api url '{}' must use http or https",
            config.url
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.push_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "push-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.poll_interval_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "poll-interval-ms must be >= 100ms, got {}ms",
            config.poll_interval_ms
        )));
    }

    Ok(())
}

/// Validates sequential scrape settings
fn validate_scrape_config(config: &ScrapeConfig) -> Result<(), ConfigError> {
    validate_seconds("scrape.delay-secs", config.delay_secs)?;
    validate_seconds("scrape.max-backoff-secs", config.max_backoff_secs)?;
    validate_seconds("scrape.retry-cooldown-secs", config.retry_cooldown_secs)?;
    Ok(())
}

/// Validates crawl settings
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.limit < 1 {
        return Err(ConfigError::Validation(
            "crawl.limit must be >= 1".to_string(),
        ));
    }

    if config.max_concurrency < 1 || config.max_concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "crawl.max-concurrency must be between 1 and 100, got {}",
            config.max_concurrency
        )));
    }

    validate_seconds("crawl.delay-secs", config.delay_secs)?;
    validate_seconds("crawl.max-backoff-secs", config.max_backoff_secs)?;
    Ok(())
}

/// A duration in seconds must be non-negative and fit in a [`Duration`]
fn validate_seconds(name: &str, value: f64) -> Result<(), ConfigError> {
    if Duration::try_from_secs_f64(value).is_err() {
        return Err(ConfigError::Validation(format!(
            "{} must be a non-negative number of seconds, got {}",
            name, value
        )));
    }
    Ok(())
}
