//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the Sumi-Harvest listing harvester.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use sumi_harvest::apply_page;
use sumi_harvest::config::{load_config_with_hash, Config};
use sumi_harvest::crawler::{CrawlOrchestrator, CrawlProgress, ProgressEvent};
use sumi_harvest::output::{load_statistics, print_report, print_statistics};
use sumi_harvest::storage::export_columns;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: a resilient paginated listing harvester
///
/// Sumi-Harvest walks the pages of a search-results site, pulls the listings
/// out of each page's embedded JSON and keeps them in a CSV dataset. Progress
/// is checkpointed after every page, so an interrupted harvest picks up where
/// it stopped.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A resilient paginated listing harvester", long_about = None)]
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

    /// Start a fresh harvest, deleting the checkpoint and dataset
    #[arg(long)]
    fresh: bool,

    /// Validate config and show which pages would be fetched without fetching
    #[arg(long, conflicts_with_all = ["stats", "export"])]
    dry_run: bool,

    /// Show checkpoint and dataset statistics and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export"])]
    stats: bool,

    /// Write the chosen columns of the dataset to PATH and exit
    #[arg(long, value_name = "PATH", requires = "columns")]
    export: Option<PathBuf>,

    /// Columns to export, comma separated, in output order
    #[arg(long, value_delimiter = ',', requires = "export")]
    columns: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if let Some(destination) = &cli.export {
        handle_export(&config, destination, &cli.columns)?;
    } else {
        return handle_crawl(config, cli.fresh, cli.quiet).await;
    }

    Ok(ExitCode::SUCCESS)
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be fetched
fn handle_dry_run(config: &Config) -> Result<()> {
    println!("=== Sumi-Harvest Dry Run ===\n");

    println!("Target:");
    println!("  Base URL: {}", config.target.base_url);
    println!("  Data island: #{}", config.target.element_id);
    println!("  Listings path: {}", config.target.json_path.join("."));

    println!("\nHTTP:");
    println!("  User agent: {}", config.http.user_agent);
    println!("  Timeout: {}s", config.http.timeout_secs);
    println!("  Extra headers: {}", config.http.extra_headers.len());

    println!("\nCrawl:");
    println!(
        "  Attempts per page: {} (backoff {}ms x attempt)",
        config.crawl.max_retries, config.crawl.retry_delay_ms
    );
    println!(
        "  Cooldown: {}s after {} failed pages in a row",
        config.crawl.cooldown_secs, config.crawl.max_consecutive_failures
    );
    println!("  Delay between pages: {}ms", config.crawl.inter_page_delay_ms);
    println!("  Page limit: {}", config.crawl.max_pages);

    println!("\nOutput:");
    println!("  Dataset: {}", config.output.dataset_path.display());
    println!("  Checkpoint: {}", config.checkpoint_path().display());
    if !config.output.require_columns.is_empty() {
        println!("  Required columns: {}", config.output.require_columns.join(", "));
    }

    let stats = load_statistics(config)?;
    let first_page = stats.next_page();

    println!("\nFirst pages:");
    let last_page = first_page
        .saturating_add(2)
        .min(config.crawl.max_pages);
    for page in first_page..=last_page {
        println!("  {}", apply_page(&config.target.base_url, page)?);
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start at page {} with {} existing rows",
        first_page, stats.total_rows
    );

    Ok(())
}

/// Handles the --stats mode: shows checkpoint and dataset statistics
fn handle_stats(config: &Config) -> Result<()> {
    let stats = load_statistics(config)?;
    print_statistics(&stats);
    Ok(())
}

/// Handles the --export mode: writes a column subset of the dataset
fn handle_export(config: &Config, destination: &Path, columns: &[String]) -> Result<()> {
    let rows = export_columns(&config.output.dataset_path, columns, destination)
        .with_context(|| format!("Failed to export {}", config.output.dataset_path.display()))?;

    println!("✓ Exported {} rows to: {}", rows, destination.display());
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, fresh: bool, quiet: bool) -> Result<ExitCode> {
    let mut orchestrator = CrawlOrchestrator::new(config).context("Failed to build HTTP client")?;

    if fresh {
        tracing::info!("Starting fresh harvest (ignoring previous state)");
        orchestrator.reset_storage()?;
    } else {
        tracing::info!("Starting harvest (will resume from checkpoint if one exists)");
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, saving progress...");
                cancel.cancel();
            }
        }
    });

    let mut progress = orchestrator.subscribe();
    let watcher = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let snapshot = progress.borrow_and_update().clone();
            log_progress(&snapshot);
        }
    });

    let report = orchestrator.run(cancel).await?;

    // Dropping the orchestrator closes the progress channel
    drop(orchestrator);
    let _ = watcher.await;

    if !quiet {
        print_report(&report);
    }

    Ok(ExitCode::from(report.outcome.exit_code()))
}

fn log_progress(progress: &CrawlProgress) {
    match &progress.event {
        ProgressEvent::CoolingDown { duration } => tracing::info!(
            "Waiting {}s before retrying page {}",
            duration.as_secs(),
            progress.page
        ),
        ProgressEvent::PageFailed { reason } => tracing::debug!(
            "Page {} failed ({} in a row, last completed page {}): {}",
            progress.page,
            progress.consecutive_failures,
            progress.last_completed_page,
            reason
        ),
        event => tracing::debug!(
            "Progress: page {}, {} rows ({:?})",
            progress.page,
            progress.total_rows,
            event
        ),
    }
}
