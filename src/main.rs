//! Atlas-Walker main entry point
//!
//! This is the command-line interface for the Atlas-Walker catalog crawler.

use anyhow::Context;
use atlas_walker::config::{load_config_with_hash, validate, Config};
use atlas_walker::output::print_summary;
use atlas_walker::{Orchestrator, StageKind};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Atlas-Walker: a staged catalog crawler
///
/// Atlas-Walker walks a travel catalog from regions down to countries,
/// cities and listings, and writes the de-duplicated hierarchy as a single
/// JSON document.
#[derive(Parser, Debug)]
#[command(name = "atlas-walker")]
#[command(version = "1.0.0")]
#[command(about = "A staged catalog crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output JSON path
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Maximum in-flight tasks per stage
    #[arg(long)]
    concurrency: Option<usize>,

    /// Maximum number of regions (0 = unlimited)
    #[arg(long)]
    max_regions: Option<usize>,

    /// Maximum countries per region (0 = unlimited)
    #[arg(long)]
    max_countries: Option<usize>,

    /// Maximum listing pages per country or city (0 = unlimited)
    #[arg(long)]
    max_pages: Option<usize>,

    /// Lower bound of the per-request delay, in milliseconds
    #[arg(long)]
    delay_min_ms: Option<u64>,

    /// Upper bound of the per-request delay, in milliseconds
    #[arg(long)]
    delay_max_ms: Option<u64>,

    /// Retries after the first attempt of each request
    #[arg(long)]
    max_retries: Option<u32>,

    /// Also collect cities and popular regions for every country
    #[arg(long)]
    with_cities: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the stage plan without crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };

    apply_overrides(&mut config, &cli);
    validate(&config).context("invalid configuration")?;

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_crawl(config).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("atlas_walker=info,warn"),
            1 => EnvFilter::new("atlas_walker=debug,info"),
            2 => EnvFilter::new("atlas_walker=trace,debug"),
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

/// Layers command-line flags over the file configuration
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(output) = &cli.output {
        config.output.path = output.display().to_string();
    }
    if let Some(concurrency) = cli.concurrency {
        config.crawler.concurrency = concurrency;
    }
    if let Some(max_regions) = cli.max_regions {
        config.crawler.max_regions = max_regions;
    }
    if let Some(max_countries) = cli.max_countries {
        config.crawler.max_countries = max_countries;
    }
    if let Some(max_pages) = cli.max_pages {
        config.crawler.max_pages = max_pages;
    }
    if let Some(delay_min_ms) = cli.delay_min_ms {
        config.fetch.delay_min_ms = delay_min_ms;
    }
    if let Some(delay_max_ms) = cli.delay_max_ms {
        config.fetch.delay_max_ms = delay_max_ms;
    }
    if let Some(max_retries) = cli.max_retries {
        config.fetch.max_retries = max_retries;
    }
    if cli.with_cities {
        config.crawler.stages = vec![
            StageKind::Regions,
            StageKind::Countries,
            StageKind::Cities,
            StageKind::Listings,
        ];
    }
}

fn limit(value: usize) -> String {
    if value == 0 {
        "unlimited".to_string()
    } else {
        value.to_string()
    }
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Atlas-Walker Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Stages: {:?}", config.crawler.stages);
    println!("  Concurrency: {}", config.crawler.concurrency);
    println!("  Max regions: {}", limit(config.crawler.max_regions));
    println!("  Max countries per region: {}", limit(config.crawler.max_countries));
    println!("  Max pages per listing: {}", limit(config.crawler.max_pages));

    println!("\nFetch:");
    println!("  Max retries: {}", config.fetch.max_retries);
    println!(
        "  Delay window: {}-{}ms",
        config.fetch.delay_min_ms, config.fetch.delay_max_ms
    );
    println!(
        "  Backoff: {}ms base, {}ms cap",
        config.fetch.backoff_base_ms, config.fetch.backoff_max_ms
    );
    println!("  Minimum body: {} bytes", config.fetch.min_body_bytes);

    println!("\nSite:");
    println!("  Base URL: {}", config.site.base_url);
    println!("  Catalog: {}", config.site.catalog_path);
    println!("  Bootstrap paths: {}", config.site.bootstrap_paths.len());
    println!("  User agents: {}", config.identity.user_agents.len());

    println!("\nOutput:");
    println!("  Path: {}", config.output.path);
    println!("  Checkpoints: {}", config.output.checkpoint);

    println!("\n✓ Configuration is valid");
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(config).context("failed to initialize crawler")?;

    let cancel = orchestrator.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight tasks");
            cancel.cancel();
        }
    });

    match orchestrator.run().await {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
