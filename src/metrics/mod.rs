//! Throughput metrics and completion estimates
//!
//! `Metrics` holds one mutex-protected block of counters that the crawler
//! updates while the run loop reads rates and ETC from it. Completed runs are
//! appended to a JSON-lines history whose recent entries seed the next run's
//! estimate.

mod estimator;
mod history;

pub use estimator::{Counters, Metrics, RateSample, MIN_TIME_SLICE};
pub use history::{append_run, read_runs, warm_start_rate, HistoricalRun};

use crate::storage::StorageError;
use thiserror::Error;

/// Errors raised by the metrics estimator and run history
#[derive(Debug, Error)]
pub enum MetricsError {
    /// ETC was requested before any expected total was recorded
    #[error("Expected totals were never set")]
    TotalsUnset,

    /// Work remains but nothing has been processed yet
    #[error("No throughput observed yet")]
    NoThroughput,

    #[error("Run history error: {0}")]
    History(#[from] StorageError),
}
