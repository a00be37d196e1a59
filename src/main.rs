//! Threadkeeper main entry point
//!
//! This is the command-line interface for the Threadkeeper forum archiver.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use threadkeeper::config::{load_config_with_hash, Config};
use threadkeeper::crawler::run_archive;
use threadkeeper::storage::{ArchiveStorage, FsStorage};
use tracing_subscriber::EnvFilter;

/// Threadkeeper: a resumable forum topic archiver
///
/// Threadkeeper walks every page of the configured forum sections, reconciles
/// the topics it finds with a rescan of each first page, and keeps the result
/// in an on-disk archive that can be resumed, backed up and summarized.
#[derive(Parser, Debug)]
#[command(name = "threadkeeper")]
#[command(version = "1.0.0")]
#[command(about = "A resumable forum topic archiver", long_about = None)]
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

    /// Start over, forgetting which sections were already completed
    #[arg(long)]
    fresh: bool,

    /// Validate config and check the archive without fetching anything
    #[arg(long, conflicts_with_all = ["stats", "backup", "export_summary"])]
    dry_run: bool,

    /// Show statistics of the archive and exit
    #[arg(long, conflicts_with_all = ["dry_run", "backup", "export_summary"])]
    stats: bool,

    /// Take one backup of the archive, check the quota and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "export_summary"])]
    backup: bool,

    /// Generate markdown summary from the archive and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "backup"])]
    export_summary: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

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

    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.backup {
        handle_backup(&config)?;
    } else if cli.export_summary {
        handle_export_summary(&config, &config_hash)?;
    } else {
        handle_archive(config, &config_hash, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("threadkeeper=info,warn"),
            1 => EnvFilter::new("threadkeeper=debug,info"),
            2 => EnvFilter::new("threadkeeper=trace,debug"),
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

/// Handles the --dry-run mode: validates config and checks the archive root
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Threadkeeper Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Request delay: {}ms", config.crawler.request_delay);
    println!("  Topics per listing page: {}", config.crawler.items_per_page);
    println!("  Posts per topic page: {}", config.crawler.posts_per_page);
    println!("  Archive topic pages: {}", config.crawler.archive_topics);
    println!("  Timeout: {}s", config.crawler.timeout_secs);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nArchive:");
    println!("  Root: {}", config.archive.root);
    println!(
        "  Backups: {}/{}-* (every {} sections, keep {})",
        config.archive.backup_dir,
        config.archive.backup_prefix,
        config.archive.backup_every,
        config.archive.keep_backups
    );
    if config.archive.quota_bytes > 0 {
        println!(
            "  Quota: {} bytes (warn at {}%)",
            config.archive.quota_bytes, config.archive.quota_warning_percent
        );
    } else {
        println!("  Quota: disabled");
    }

    println!("\nSections ({}):", config.sections.len());
    for section in &config.sections {
        println!("  - {} {} ({})", section.id, section.name, section.url);
    }

    let root = Path::new(&config.archive.root);
    if root.exists() {
        let storage = FsStorage::new(root);
        storage
            .validate()
            .with_context(|| format!("archive at {} is not usable", root.display()))?;
        let progress = storage.read_progress()?;
        let completion = storage.load_completion()?;
        println!(
            "\n✓ Existing archive is valid ({:.1}% done, {} sections complete)",
            progress.percentage,
            completion.completed.len()
        );
    } else {
        println!("\n✓ Archive will be created at {}", root.display());
    }

    println!("✓ Configuration is valid");
    println!("✓ Would scan {} sections", config.sections.len());

    Ok(())
}

/// Handles the --stats mode: shows statistics of the archive
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use threadkeeper::output::{load_statistics, print_statistics};

    println!("Archive: {}\n", config.archive.root);

    let stats = load_statistics(
        Path::new(&config.archive.root),
        Path::new(&config.archive.backup_dir),
        &config.archive.backup_prefix,
    )?;

    print_statistics(&stats);

    Ok(())
}

/// Handles the --backup mode: one snapshot, retention and a quota check
fn handle_backup(config: &Config) -> anyhow::Result<()> {
    use threadkeeper::storage::{check_quota, create_backup, prune_backups};

    let root = Path::new(&config.archive.root);
    let backup_dir = Path::new(&config.archive.backup_dir);

    if !root.is_dir() {
        anyhow::bail!("no archive at {}", root.display());
    }

    let path = create_backup(root, backup_dir, &config.archive.backup_prefix)
        .with_context(|| format!("backup of {} failed", root.display()))?;
    println!("✓ Backup created at: {}", path.display());

    let removed = prune_backups(
        backup_dir,
        &config.archive.backup_prefix,
        config.archive.keep_backups,
    )?;
    if !removed.is_empty() {
        println!("  Pruned {} old backups", removed.len());
    }

    let quota = check_quota(
        root,
        config.archive.quota_warning_percent,
        config.archive.quota_bytes,
    )?;
    match quota.usage_percent {
        Some(percent) => println!(
            "  Quota: {} of {} bytes ({:.1}%){}",
            quota.usage_bytes,
            quota.quota_bytes,
            percent,
            if quota.warning { " - WARNING" } else { "" }
        ),
        None => println!("  Usage: {} bytes (no quota)", quota.usage_bytes),
    }

    Ok(())
}

/// Handles the --export-summary mode: generates markdown summary
fn handle_export_summary(config: &Config, config_hash: &str) -> anyhow::Result<()> {
    use threadkeeper::output::{generate_markdown_summary, generate_summary};

    println!("=== Exporting Archive Summary ===\n");
    println!("Archive: {}", config.archive.root);
    println!("Output: {}", config.output.summary_path);
    println!();

    tracing::info!("Loading archive statistics...");
    let summary = generate_summary(config, config_hash)?;

    tracing::info!("Generating markdown summary...");
    generate_markdown_summary(&summary, Path::new(&config.output.summary_path))?;

    println!("✓ Summary exported to: {}", config.output.summary_path);

    Ok(())
}

/// Handles the main archive run
async fn handle_archive(config: Config, config_hash: &str, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh run (completed sections will be scanned again)");
    } else {
        tracing::info!("Starting run (completed sections are skipped)");
    }

    tracing::info!(
        "Sections: {}, archive root: {}",
        config.sections.len(),
        config.archive.root
    );

    let report = match run_archive(config, config_hash, fresh).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            return Err(e.into());
        }
    };

    for (section, reason) in &report.sections_failed {
        tracing::warn!("Section {} left pending: {}", section, reason);
    }

    if report.is_finished() {
        tracing::info!(
            "Run {} completed: {} topics committed",
            report.run_id,
            report.topics_committed
        );
    } else {
        tracing::warn!(
            "Run {} finished with {} of {} sections pending; run again to resume",
            report.run_id,
            report.sections_failed.len(),
            report.sections_total
        );
    }

    Ok(())
}
