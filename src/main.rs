//! Catalog-Harvest main entry point
//!
//! This is the command-line interface for the catalog listing harvester.

use anyhow::{Context, Result};
use catalog_harvest::config::{load_config_with_hash, validate, Config};
use catalog_harvest::crawler::run_harvest;
use catalog_harvest::model::FetchTask;
use catalog_harvest::output::{load_statistics, print_statistics, write_records_csv};
use catalog_harvest::storage::open_sink;
use catalog_harvest::url::build_listing_url;
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Catalog-Harvest: a bounded-concurrency listing harvester
///
/// Walks the paginated game listing for each platform category, extracts one
/// record per card, downloads and normalizes cover images, and stores
/// everything in SQLite with a CSV export and a markdown run summary.
#[derive(Parser, Debug)]
#[command(name = "catalog-harvest")]
#[command(version)]
#[command(about = "A bounded-concurrency listing harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be harvested without fetching
    #[arg(long, conflicts_with_all = ["stats", "export"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export"])]
    stats: bool,

    /// Export every stored record to a CSV file and exit
    #[arg(long, value_name = "CSV", conflicts_with_all = ["dry_run", "stats"])]
    export: Option<PathBuf>,

    /// Harvest only this category (repeatable); overrides the config list
    #[arg(long = "category", value_name = "KEY")]
    categories: Vec<String>,

    /// Stop each category after this many pages
    #[arg(long, value_name = "N")]
    max_pages: Option<u32>,

    /// Number of concurrent page fetches
    #[arg(long, value_name = "N")]
    concurrency: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    apply_overrides(&mut config, &cli).context("Invalid command-line override")?;

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if let Some(path) = &cli.export {
        handle_export(&config, path)
    } else {
        handle_harvest(&config, &config_hash).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_harvest=info,warn"),
            1 => EnvFilter::new("catalog_harvest=debug,info"),
            2 => EnvFilter::new("catalog_harvest=trace,debug"),
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

/// Applies CLI overrides on top of the loaded config and re-validates
fn apply_overrides(config: &mut Config, cli: &Cli) -> Result<()> {
    if !cli.categories.is_empty() {
        config.categories = cli.categories.clone();
    }
    if cli.max_pages.is_some() {
        config.pipeline.max_pages = cli.max_pages;
    }
    if let Some(concurrency) = cli.concurrency {
        config.pipeline.concurrency = concurrency;
    }

    validate(config)?;
    Ok(())
}

/// Handles the --dry-run mode: validates config and shows what would be harvested
fn handle_dry_run(config: &Config) -> Result<()> {
    println!("=== Catalog-Harvest Dry Run ===\n");

    println!("Pipeline Configuration:");
    println!("  Page workers: {}", config.pipeline.concurrency);
    println!("  Image workers: {}", config.pipeline.image_concurrency);
    match config.pipeline.max_pages {
        Some(cap) => println!("  Max pages per category: {}", cap),
        None => println!("  Max pages per category: until an empty page"),
    }
    println!(
        "  Attempts per request: {} (backoff {}ms..{}ms, timeout {}ms)",
        config.pipeline.max_attempts,
        config.pipeline.backoff_base_ms,
        config.pipeline.backoff_max_ms,
        config.pipeline.request_timeout_ms
    );

    println!("\nImages:");
    if config.images.enabled {
        println!("  Directory: {}", config.images.directory);
        println!("  JPEG quality: {}", config.images.jpeg_quality);
    } else {
        println!("  Disabled");
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  CSV: {}", config.output.csv_path);
    println!("  Summary: {}", config.output.summary_path);
    if config.output.per_category {
        println!("  Per-category CSVs: next to {}", config.output.csv_path);
    }

    println!("\nCategories ({}):", config.categories.len());
    for category in &config.categories {
        let url = build_listing_url(&config.site, &FetchTask::new(category.clone(), 1))
            .with_context(|| format!("Cannot build listing URL for {}", category))?;
        println!("  - {} -> {}", category, url);
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let sink = open_sink(config).context("Failed to open database")?;
    let stats = load_statistics(&sink).context("Failed to load statistics")?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export mode: writes every stored record to CSV
fn handle_export(config: &Config, path: &Path) -> Result<()> {
    let sink = open_sink(config).context("Failed to open database")?;
    let records = sink.load_records().context("Failed to load records")?;

    let written = write_records_csv(path, &records)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("✓ Exported {} records to: {}", written, path.display());

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: &Config, config_hash: &str) -> Result<()> {
    tracing::info!(
        "Categories: {}, page workers: {}, images: {}",
        config.categories.join(", "),
        config.pipeline.concurrency,
        if config.images.enabled { "on" } else { "off" }
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight work");
            on_signal.cancel();
        }
    });

    let (result, _sink) = run_harvest(config, config_hash, cancel)
        .await
        .context("Harvest failed")?;

    let summary = &result.summary;
    if summary.cancelled {
        tracing::warn!(
            "Harvest interrupted after {} records",
            summary.total_records
        );
    } else {
        tracing::info!("Harvest completed successfully");
    }

    Ok(())
}
