//! Scrape-Keeper main entry point
//!
//! This is the command-line interface for the Scrape-Keeper page fetcher.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use scrape_keeper::client::{ApiClient, CrawlRequest};
use scrape_keeper::config::{load_config_with_hash, validate, Config};
use scrape_keeper::input::{crawl_output_dir, default_output_dir, is_url, parse_url_file};
use scrape_keeper::output::MarkdownOptions;
use scrape_keeper::pipeline::{crawl_site, scrape_list, scrape_single, PageSink, RunSummary};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Scrape-Keeper: a resumable page fetcher for a remote scraping API
///
/// Scrape-Keeper sends single pages, URL lists and whole-site crawls through
/// a scraping backend and saves every result as markdown next to a manifest,
/// so interrupted runs can pick up where they stopped.
#[derive(Parser, Debug)]
#[command(name = "scrape-keeper")]
#[command(version = "1.0.0")]
#[command(about = "A resumable page fetcher for a remote scraping API", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Backend API base URL (overrides the config file)
    #[arg(long, value_name = "URL", global = true)]
    api_url: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape one URL, or every URL listed in a file
    Scrape(ScrapeArgs),

    /// Crawl a site starting from a URL
    Crawl(CrawlArgs),
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Prepend YAML front matter to every file
    #[arg(long)]
    front_matter: bool,

    /// Re-fetch URLs the manifest already lists as saved
    #[arg(long)]
    overwrite: bool,
}

#[derive(Args, Debug)]
struct RetryArgs {
    /// Retries per URL after the first attempt
    #[arg(long, value_name = "N")]
    max_retries: Option<u32>,

    /// Cap on the exponential backoff in seconds
    #[arg(long, value_name = "SECS")]
    max_backoff: Option<f64>,
}

#[derive(Args, Debug)]
struct ScrapeArgs {
    /// A URL, or a file with one URL per line
    input: String,

    #[command(flatten)]
    output: OutputArgs,

    #[command(flatten)]
    retry: RetryArgs,

    /// Submit the URL list as one batch job instead of fetching sequentially
    #[arg(long)]
    batch: bool,

    /// Upper bound of the random pause between URLs in seconds
    #[arg(long, value_name = "SECS")]
    delay: Option<f64>,
}

#[derive(Args, Debug)]
struct CrawlArgs {
    /// Start URL
    url: String,

    #[command(flatten)]
    output: OutputArgs,

    #[command(flatten)]
    retry: RetryArgs,

    /// Maximum number of pages
    #[arg(long, value_name = "N")]
    limit: Option<u32>,

    /// Maximum link depth from the start URL
    #[arg(long, value_name = "N")]
    max_depth: Option<u32>,

    /// Pages the backend may fetch in parallel
    #[arg(long, value_name = "N")]
    max_concurrency: Option<u32>,

    /// Delay between backend requests in seconds
    #[arg(long, value_name = "SECS")]
    delay: Option<f64>,

    /// Milliseconds the backend waits for each page to render
    #[arg(long, value_name = "MS")]
    wait_for: Option<u64>,

    /// Only crawl paths matching this pattern (repeatable)
    #[arg(long = "include", value_name = "PATTERN")]
    include: Vec<String>,

    /// Skip paths matching this pattern (repeatable)
    #[arg(long = "exclude", value_name = "PATTERN")]
    exclude: Vec<String>,

    /// Follow links to other domains
    #[arg(long)]
    allow_external: bool,

    /// Follow links to subdomains of the start host
    #[arg(long)]
    allow_subdomains: bool,

    /// Follow links above the start path
    #[arg(long)]
    allow_backward_links: bool,

    /// Do not seed the crawl from the sitemap
    #[arg(long)]
    ignore_sitemap: bool,

    /// Ignore robots.txt on the backend
    #[arg(long)]
    ignore_robots: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(summary) => {
            tracing::info!("Completed: {}", summary);
            ExitCode::from(summary.exit_code() as u8)
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("scrape_keeper=info,warn"),
            1 => EnvFilter::new("scrape_keeper=debug,info"),
            2 => EnvFilter::new("scrape_keeper=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<RunSummary> {
    let mut config = load_configuration(cli.config.as_deref())?;
    if let Some(url) = cli.api_url {
        config.api.url = url;
    }

    match cli.command {
        Command::Scrape(args) => {
            apply_scrape_overrides(&mut config, &args);
            validate(&config).context("Invalid configuration")?;
            handle_scrape(config, args).await
        }
        Command::Crawl(args) => {
            apply_crawl_overrides(&mut config, &args);
            validate(&config).context("Invalid configuration")?;
            handle_crawl(config, args).await
        }
    }
}

/// Loads the config file if one was given, otherwise the defaults
fn load_configuration(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        tracing::debug!("No configuration file given, using defaults");
        return Ok(Config::default());
    };

    tracing::info!("Loading configuration from: {}", path.display());
    let (config, hash) = load_config_with_hash(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);
    Ok(config)
}

fn apply_output_overrides(config: &mut Config, args: &OutputArgs) {
    if let Some(dir) = &args.out {
        config.output.dir = Some(dir.clone());
    }
    config.output.front_matter |= args.front_matter;
    config.output.overwrite |= args.overwrite;
}

fn apply_scrape_overrides(config: &mut Config, args: &ScrapeArgs) {
    apply_output_overrides(config, &args.output);
    let scrape = &mut config.scrape;
    scrape.batch |= args.batch;
    if let Some(delay) = args.delay {
        scrape.delay_secs = delay;
    }
    if let Some(retries) = args.retry.max_retries {
        scrape.max_retries = retries;
    }
    if let Some(backoff) = args.retry.max_backoff {
        scrape.max_backoff_secs = backoff;
    }
}

fn apply_crawl_overrides(config: &mut Config, args: &CrawlArgs) {
    apply_output_overrides(config, &args.output);
    let crawl = &mut config.crawl;
    if let Some(limit) = args.limit {
        crawl.limit = limit;
    }
    if let Some(depth) = args.max_depth {
        crawl.max_depth = depth;
    }
    if let Some(concurrency) = args.max_concurrency {
        crawl.max_concurrency = concurrency;
    }
    if let Some(delay) = args.delay {
        crawl.delay_secs = delay;
    }
    if let Some(wait_for) = args.wait_for {
        crawl.wait_for_ms = wait_for;
    }
    if !args.include.is_empty() {
        crawl.include_paths = args.include.clone();
    }
    if !args.exclude.is_empty() {
        crawl.exclude_paths = args.exclude.clone();
    }
    crawl.allow_external_links |= args.allow_external;
    crawl.allow_subdomains |= args.allow_subdomains;
    crawl.allow_backward_links |= args.allow_backward_links;
    crawl.ignore_sitemap |= args.ignore_sitemap;
    crawl.ignore_robots_txt |= args.ignore_robots;
    if let Some(retries) = args.retry.max_retries {
        crawl.max_retries = retries;
    }
    if let Some(backoff) = args.retry.max_backoff {
        crawl.max_backoff_secs = backoff;
    }
}

/// Cancels the returned token on Ctrl-C
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping");
            signal.cancel();
        }
    });
    token
}

fn markdown_options(config: &Config) -> MarkdownOptions {
    MarkdownOptions {
        front_matter: config.output.front_matter,
    }
}

/// Handles the scrape command
async fn handle_scrape(config: Config, args: ScrapeArgs) -> anyhow::Result<RunSummary> {
    let cwd = std::env::current_dir().context("Cannot determine the current directory")?;
    let out_dir = default_output_dir(&args.input, config.output.dir.as_deref(), &cwd);
    let sink = PageSink::new(&out_dir, markdown_options(&config));
    let client = Arc::new(ApiClient::new(&config.api)?);

    if is_url(&args.input) {
        return Ok(scrape_single(&client, args.input.trim(), &sink).await?);
    }

    let path = Path::new(&args.input);
    if !path.exists() {
        bail!("File not found: {}", args.input);
    }
    let urls = parse_url_file(path)?;
    if urls.is_empty() {
        bail!("No URLs found in {}", args.input);
    }

    tracing::info!("Output directory: {}", out_dir.display());
    tracing::debug!("URLs to process: {}", urls.len());

    let cancel = shutdown_token();
    let summary = scrape_list(&client, &urls, &sink, &config, &cancel).await?;
    if summary.failed > 0 {
        tracing::info!("Failed URLs saved to: {}", sink.manifest().errors_path().display());
    }
    Ok(summary)
}

/// Handles the crawl command
async fn handle_crawl(config: Config, args: CrawlArgs) -> anyhow::Result<RunSummary> {
    let cwd = std::env::current_dir().context("Cannot determine the current directory")?;
    let start_url = args.url.trim();
    let out_dir = crawl_output_dir(start_url, config.output.dir.as_deref(), &cwd)?;
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("Cannot create output directory {}", out_dir.display()))?;

    tracing::info!("Output: {}", out_dir.display());
    tracing::debug!(
        "Crawl limit: {}, max depth: {}, concurrency: {}, delay: {}s",
        config.crawl.limit,
        config.crawl.max_depth,
        config.crawl.max_concurrency,
        config.crawl.delay_secs
    );

    let sink = PageSink::new(&out_dir, markdown_options(&config));
    let client = Arc::new(ApiClient::new(&config.api)?);
    let request = CrawlRequest::new(start_url, &config.crawl);

    let summary = crawl_site(&client, &request, &sink, &config, shutdown_token()).await?;
    if summary.failed > 0 {
        tracing::info!("Errors: {}", sink.manifest().errors_path().display());
    }
    Ok(summary)
}
