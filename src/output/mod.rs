//! Output module for archive reports
//!
//! This module handles:
//! - Gathering statistics from an archive root and its backups
//! - Printing those statistics to the terminal
//! - Generating a markdown summary of the archive and recent runs

mod markdown;
pub mod stats;

pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use stats::{load_statistics, print_statistics, ArchiveStatistics, SectionSummary};

use crate::config::Config;
use crate::metrics::{read_runs, HistoricalRun, MetricsError};
use crate::storage::StorageError;
use std::path::Path;
use thiserror::Error;

/// Number of recorded runs listed in a summary
pub const SUMMARY_RUNS: usize = 10;

/// Errors that can occur while producing reports
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Run history error: {0}")]
    History(#[from] MetricsError),
}

pub type OutputResult<T> = Result<T, OutputError>;

/// Everything shown in an exported archive summary
#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    pub generated_at: String,
    pub config_hash: String,

    /// Configured sections as `(id, name)`, in configuration order
    pub configured_sections: Vec<(String, String)>,

    pub statistics: ArchiveStatistics,

    /// Most recent runs, oldest first
    pub recent_runs: Vec<HistoricalRun>,
}

impl ArchiveSummary {
    /// Configured sections not yet recorded as complete
    pub fn pending_sections(&self) -> Vec<&str> {
        self.configured_sections
            .iter()
            .filter(|(id, _)| {
                !self
                    .statistics
                    .sections
                    .iter()
                    .any(|s| &s.id == id && s.completed)
            })
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

/// Builds a summary from the archive described by `config`
pub fn generate_summary(config: &Config, config_hash: &str) -> OutputResult<ArchiveSummary> {
    let statistics = load_statistics(
        Path::new(&config.archive.root),
        Path::new(&config.archive.backup_dir),
        &config.archive.backup_prefix,
    )?;

    let mut runs = read_runs(Path::new(&config.metrics.history_path))?;
    let recent_runs = runs.split_off(runs.len().saturating_sub(SUMMARY_RUNS));

    Ok(ArchiveSummary {
        generated_at: chrono::Utc::now().to_rfc3339(),
        config_hash: config_hash.to_string(),
        configured_sections: config
            .sections
            .iter()
            .map(|s| (s.id.clone(), s.name.clone()))
            .collect(),
        statistics,
        recent_runs,
    })
}
