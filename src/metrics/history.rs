//! Append-only log of completed runs
//!
//! One JSON object per line. Lines are never rewritten; a run's record is
//! appended once when the run finishes.

use crate::metrics::MetricsError;
use crate::storage::StorageError;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Summary of one completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRun {
    /// RFC 3339 completion time
    pub timestamp: String,
    pub run_id: String,
    pub duration_secs: f64,
    pub pages_archived: u64,
    pub topics_archived: u64,
    pub bytes_archived: u64,
    pub avg_pages_per_sec: f64,
    pub avg_topics_per_sec: f64,
}

/// Appends `run` as one line to the log at `path`, creating it if needed
pub fn append_run(path: &Path, run: &HistoricalRun) -> Result<(), MetricsError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StorageError::from_io(parent, e))?;
    }

    let line = serde_json::to_string(run)
        .map_err(|e| StorageError::invalid_format(path, e.to_string()))?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| StorageError::from_io(path, e))?;
    writeln!(file, "{}", line).map_err(|e| StorageError::from_io(path, e))?;

    tracing::debug!("Appended run {} to {}", run.run_id, path.display());
    Ok(())
}

/// Reads every recorded run, oldest first
///
/// A missing log means no runs were recorded yet. Blank lines are ignored;
/// any other unparsable line is an invalid-format error.
pub fn read_runs(path: &Path) -> Result<Vec<HistoricalRun>, MetricsError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::from_io(path, e).into()),
    };

    let mut runs = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let run = serde_json::from_str(line).map_err(|e| {
            StorageError::invalid_format(path, format!("line {}: {}", index + 1, e))
        })?;
        runs.push(run);
    }
    Ok(runs)
}

/// Mean average page rate of the last `window` runs
///
/// This is a coarse starting estimate for a new run. Returns `None` when no
/// runs are recorded or `window` is zero.
pub fn warm_start_rate(path: &Path, window: usize) -> Result<Option<f64>, MetricsError> {
    if window == 0 {
        return Ok(None);
    }

    let runs = read_runs(path)?;
    let recent = &runs[runs.len().saturating_sub(window)..];
    if recent.is_empty() {
        return Ok(None);
    }

    let total: f64 = recent.iter().map(|run| run.avg_pages_per_sec).sum();
    Ok(Some(total / recent.len() as f64))
}
