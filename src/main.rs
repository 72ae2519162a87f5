//! Thread-Harvest main entry point
//!
//! This is the command-line interface for the Thread-Harvest channel exporter.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use thread_harvest::config::{load_config_with_hash, Config};
use thread_harvest::crawler::{Coordinator, RunSummary, StopFlag};
use thread_harvest::output::{open_sink, write_parent_csv, RunStatus};
use thread_harvest::storage::{CheckpointStore, ProgressTracker};
use tracing_subscriber::EnvFilter;

/// Runs listed by --status
const RECENT_RUNS: usize = 5;

/// Thread-Harvest: an incremental exporter for threaded channel history
///
/// Thread-Harvest pages through a channel's messages, fetches the replies of
/// every thread, and keeps a checkpoint so later runs only fetch what is new.
#[derive(Parser, Debug)]
#[command(name = "thread-harvest")]
#[command(version = "1.0.0")]
#[command(about = "An incremental, resumable thread history exporter", long_about = None)]
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

    /// Discard the checkpoint and progress, re-exporting the full history
    #[arg(long)]
    fresh: bool,

    /// Show checkpoint, progress, export counts and recent runs and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_csv", "fresh"])]
    status: bool,

    /// Validate config and show what a run would do without fetching
    #[arg(long, conflicts_with_all = ["status", "export_csv"])]
    dry_run: bool,

    /// Write the flattened thread list from the existing export and exit
    #[arg(long, value_name = "PATH", conflicts_with_all = ["status", "dry_run", "fresh"])]
    export_csv: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config, cli.fresh)?;
    } else if cli.status {
        handle_status(&config)?;
    } else if let Some(path) = &cli.export_csv {
        handle_export_csv(&config, path)?;
    } else {
        handle_harvest(config, config_hash, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("thread_harvest=info,warn"),
            1 => EnvFilter::new("thread_harvest=debug,info"),
            2 => EnvFilter::new("thread_harvest=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows the resume point
fn handle_dry_run(config: &Config, fresh: bool) -> anyhow::Result<()> {
    println!("=== Thread-Harvest Dry Run ===\n");

    println!("Source:");
    println!("  API: {}", config.slack.api_base_url);
    println!("  Channel: {}", config.slack.channel_id);
    println!(
        "  Token: {}",
        if config.slack.resolved_token().is_some() {
            "configured"
        } else {
            "missing"
        }
    );
    println!(
        "  Cookie: {}",
        if config.slack.cookie.is_some() { "set" } else { "not set" }
    );

    println!("\nHarvest Configuration:");
    println!("  Reply concurrency: {}", config.harvest.reply_concurrency);
    println!(
        "  Permalink concurrency: {}",
        config.harvest.permalink_concurrency
    );
    println!("  Page limit: {}", config.harvest.page_limit);
    println!("  Request timeout: {}s", config.harvest.request_timeout_secs);
    println!(
        "  Transient retries: {} (initial backoff {}ms)",
        config.harvest.max_transient_retries, config.harvest.initial_backoff_ms
    );
    match config.harvest.max_parent_attempts {
        Some(max) => println!("  Max parent attempts: {}", max),
        None => println!("  Max parent attempts: unlimited"),
    }

    println!("\nOutput:");
    println!("  Directory: {}", config.output.directory.display());
    println!("  Format: {:?}", config.output.format);
    println!("  CSV: {}", config.output.csv);

    println!("\n✓ Configuration is valid");
    if fresh {
        println!("✓ Would discard resume state and fetch the full history");
    } else {
        let checkpoint = CheckpointStore::new(config.output.checkpoint_path()).load()?;
        let progress = ProgressTracker::new(config.output.progress_path()).load()?;
        match checkpoint {
            Some(position) => println!("✓ Would fetch threads newer than {}", position),
            None => println!("✓ Would fetch the full history"),
        }
        println!(
            "✓ {} threads queued for replies from an earlier run",
            progress.remaining().len()
        );
    }

    Ok(())
}

/// Handles the --status mode: shows resume state and export counts
fn handle_status(config: &Config) -> anyhow::Result<()> {
    let checkpoint = CheckpointStore::new(config.output.checkpoint_path()).load()?;
    let progress = ProgressTracker::new(config.output.progress_path()).load()?;
    let sink = open_sink(&config.output)?;
    let merged = sink.merged()?;

    println!("Output: {}\n", config.output.directory.display());

    match checkpoint {
        Some(position) => println!("Checkpoint: {}", position),
        None => println!("Checkpoint: none"),
    }

    if progress.is_reset() {
        println!("Progress: no pass in progress");
    } else {
        println!(
            "Progress: {}/{} threads settled, {} failed this pass",
            progress.next_index,
            progress.sequence.len(),
            progress.failed.len()
        );
        for (identity, attempts) in &progress.attempts {
            println!("  - {} ({} failed passes)", identity, attempts);
        }
    }

    println!("\nExported threads: {}", merged.parents.len());
    println!("Exported replies: {}", merged.replies.len());

    let runs = sink.recent_runs(RECENT_RUNS)?;
    if !runs.is_empty() {
        println!("\nRecent runs:");
        for run in &runs {
            println!(
                "  {} {:<9} {} threads, {} replies, {} failed",
                run.started_at,
                run.status.to_db_string(),
                run.parents_fetched,
                run.replies_fetched,
                run.failures
            );
        }
    }

    Ok(())
}

/// Handles the --export-csv mode: writes the thread list from the export
fn handle_export_csv(config: &Config, path: &Path) -> anyhow::Result<()> {
    println!("=== Exporting Thread List ===\n");

    let sink = open_sink(&config.output)?;
    let merged = sink.merged()?;
    write_parent_csv(path, &merged.parents)
        .with_context(|| format!("writing {}", path.display()))?;

    println!(
        "✓ {} threads exported to: {}",
        merged.parents.len(),
        path.display()
    );

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, config_hash: String, fresh: bool) -> anyhow::Result<()> {
    let stop = StopFlag::new();
    let signal_flag = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight requests");
            signal_flag.stop();
        }
    });

    let mut coordinator = Coordinator::new(config, stop)?.with_config_hash(config_hash);
    if fresh {
        tracing::info!("Starting fresh harvest (ignoring previous state)");
        coordinator.reset()?;
    } else {
        tracing::info!("Starting harvest (will resume if an earlier run was interrupted)");
    }

    match coordinator.run().await {
        Ok(summary) => {
            report(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}

fn report(summary: &RunSummary) {
    match summary.status() {
        RunStatus::Completed => tracing::info!("Harvest completed successfully"),
        _ => tracing::warn!(
            "Harvest finished with {} failed threads; rerun to retry them",
            summary.failures.len()
        ),
    }
    if let Some(checkpoint) = &summary.checkpoint {
        tracing::info!("Checkpoint now at {}", checkpoint);
    }
}
