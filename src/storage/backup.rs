//! Timestamped backups and disk quota checks
//!
//! A backup is a directory `<parent>/<prefix>-<YYYYMMDDhhmmss>` holding a copy of
//! the archive's progress file, completion set and metadata tree. Backups are
//! never modified after creation; retention only deletes whole snapshots.
//! A snapshot appears under its final name only once it is complete.

use crate::storage::copy::copy_dir_recursive;
use crate::storage::fs::directory_size;
use crate::storage::layout::{COMPLETION_FILE, METADATA_DIR, PROGRESS_FILE};
use crate::storage::traits::{StorageError, StorageResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Timestamp format embedded in backup directory names
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// A backup directory found under a backup parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub name: String,
    pub timestamp: NaiveDateTime,
    /// Disambiguates backups taken within the same second (0 for the first)
    pub sequence: u32,
}

/// Outcome of a quota check
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaStatus {
    pub usage_bytes: u64,
    pub quota_bytes: i64,
    /// `None` when the quota is disabled
    pub usage_percent: Option<f64>,
    pub warning: bool,
}

impl QuotaStatus {
    pub fn is_enabled(&self) -> bool {
        self.quota_bytes > 0
    }
}

/// Snapshots `archive_root` under `backup_parent` using the current time
pub fn create_backup(
    archive_root: &Path,
    backup_parent: &Path,
    prefix: &str,
) -> StorageResult<PathBuf> {
    create_backup_at(archive_root, backup_parent, prefix, Utc::now())
}

/// Snapshots `archive_root` under `backup_parent`, naming the backup after `now`
///
/// A missing progress file or metadata directory is simply left out of the
/// backup. Only actual I/O failures are reported. The copy is assembled in a
/// hidden `.<prefix>-<stamp>.partial` directory and only renamed to its final
/// name once complete, so a failed backup never shows up in [`list_backups`].
pub fn create_backup_at(
    archive_root: &Path,
    backup_parent: &Path,
    prefix: &str,
    now: DateTime<Utc>,
) -> StorageResult<PathBuf> {
    fs::create_dir_all(backup_parent).map_err(|e| StorageError::from_io(backup_parent, e))?;

    let stamp = now.format(BACKUP_TIMESTAMP_FORMAT).to_string();
    let staging = backup_parent.join(format!(".{prefix}-{stamp}.partial"));
    if staging.exists() {
        tracing::warn!("Removing leftover partial backup {}", staging.display());
        fs::remove_dir_all(&staging).map_err(|e| StorageError::from_io(&staging, e))?;
    }
    fs::create_dir(&staging).map_err(|e| StorageError::from_io(&staging, e))?;

    let published = fill_backup(archive_root, &staging)
        .and_then(|()| publish_backup(backup_parent, prefix, &stamp, &staging));
    let backup_dir = match published {
        Ok(dir) => dir,
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                tracing::warn!(
                    "Could not remove partial backup {}: {}",
                    staging.display(),
                    cleanup
                );
            }
            return Err(e);
        }
    };

    tracing::info!("Created backup {}", backup_dir.display());
    Ok(backup_dir)
}

/// Copies the progress file, completion set and metadata tree into `dest`
fn fill_backup(archive_root: &Path, dest: &Path) -> StorageResult<()> {
    for file in [PROGRESS_FILE, COMPLETION_FILE] {
        let src = archive_root.join(file);
        match fs::copy(&src, dest.join(file)) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound && !src.exists() => {
                tracing::debug!("No {} to back up in {}", file, archive_root.display());
            }
            Err(e) => return Err(StorageError::from_io(&src, e)),
        }
    }

    let metadata_src = archive_root.join(METADATA_DIR);
    if metadata_src.is_dir() {
        let copied = copy_dir_recursive(&metadata_src, &dest.join(METADATA_DIR))?;
        tracing::debug!("Backed up {} metadata files", copied);
    } else {
        tracing::debug!("No metadata directory in {}", archive_root.display());
    }
    Ok(())
}

/// Renames a finished staging directory to a fresh backup name
///
/// Same-second collisions get a `-N` suffix. The suffix is always above every
/// existing one for the same second, so a pruned name is never reused for a
/// newer backup.
fn publish_backup(
    parent: &Path,
    prefix: &str,
    stamp: &str,
    staging: &Path,
) -> StorageResult<PathBuf> {
    let mut sequence = list_backups(parent, prefix)?
        .iter()
        .filter(|b| b.timestamp.format(BACKUP_TIMESTAMP_FORMAT).to_string() == stamp)
        .map(|b| b.sequence + 1)
        .max()
        .unwrap_or(0);
    loop {
        let name = if sequence == 0 {
            format!("{prefix}-{stamp}")
        } else {
            format!("{prefix}-{stamp}-{sequence}")
        };
        let candidate = parent.join(name);

        // rename(2) would silently replace an empty directory
        if candidate.exists() {
            sequence += 1;
            continue;
        }
        match fs::rename(staging, &candidate) {
            Ok(()) => return Ok(candidate),
            Err(_) if candidate.exists() => sequence += 1,
            Err(e) => return Err(StorageError::from_io(&candidate, e)),
        }
    }
}

/// Lists backups under `backup_parent`, newest first
///
/// Directories carrying the prefix but an unparsable timestamp are skipped
/// with a warning. A missing parent directory means there are no backups yet.
pub fn list_backups(backup_parent: &Path, prefix: &str) -> StorageResult<Vec<BackupEntry>> {
    let entries = match fs::read_dir(backup_parent) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::from_io(backup_parent, e)),
    };

    let name_prefix = format!("{prefix}-");
    let mut backups = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|e| StorageError::from_io(backup_parent, e))?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let Some(rest) = name.strip_prefix(&name_prefix) else {
            continue;
        };
        if !entry.path().is_dir() {
            continue;
        }

        match parse_backup_suffix(rest) {
            Some((timestamp, sequence)) => backups.push(BackupEntry {
                path: entry.path(),
                name,
                timestamp,
                sequence,
            }),
            None => {
                tracing::warn!("Skipping backup directory with bad timestamp: {}", name);
            }
        }
    }

    backups.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.sequence.cmp(&a.sequence))
    });
    Ok(backups)
}

/// Parses `<YYYYMMDDhhmmss>` or `<YYYYMMDDhhmmss>-<N>`
fn parse_backup_suffix(rest: &str) -> Option<(NaiveDateTime, u32)> {
    let (stamp, sequence) = match rest.split_once('-') {
        Some((stamp, seq)) => (stamp, seq.parse().ok()?),
        None => (rest, 0),
    };
    if stamp.len() != 14 || !stamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let timestamp = NaiveDateTime::parse_from_str(stamp, BACKUP_TIMESTAMP_FORMAT).ok()?;
    Some((timestamp, sequence))
}

/// Deletes all but the `keep` newest backups; `keep == 0` retains everything
///
/// Returns the removed directories.
pub fn prune_backups(
    backup_parent: &Path,
    prefix: &str,
    keep: usize,
) -> StorageResult<Vec<PathBuf>> {
    if keep == 0 {
        return Ok(Vec::new());
    }

    let mut removed = Vec::new();
    for backup in list_backups(backup_parent, prefix)?.into_iter().skip(keep) {
        fs::remove_dir_all(&backup.path).map_err(|e| StorageError::from_io(&backup.path, e))?;
        tracing::info!("Pruned backup {}", backup.name);
        removed.push(backup.path);
    }
    Ok(removed)
}

/// Measures `path` against an optional quota
///
/// A `quota_bytes` of zero or less disables the quota: usage is logged and the
/// warning flag is never set. Otherwise the warning is set once usage reaches
/// `warning_threshold_percent` of the quota (inclusive).
pub fn check_quota(
    path: &Path,
    warning_threshold_percent: f64,
    quota_bytes: i64,
) -> StorageResult<QuotaStatus> {
    let usage_bytes = directory_size(path)?;

    if quota_bytes <= 0 {
        tracing::info!(
            "Archive at {} uses {} bytes (no quota configured)",
            path.display(),
            usage_bytes
        );
        return Ok(QuotaStatus {
            usage_bytes,
            quota_bytes,
            usage_percent: None,
            warning: false,
        });
    }

    let usage_percent = usage_bytes as f64 / quota_bytes as f64 * 100.0;
    let warning = usage_percent >= warning_threshold_percent;

    if warning {
        tracing::warn!(
            "Archive at {} uses {:.1}% of its {} byte quota ({} bytes)",
            path.display(),
            usage_percent,
            quota_bytes,
            usage_bytes
        );
    } else {
        tracing::info!(
            "Archive at {} uses {:.1}% of its quota",
            path.display(),
            usage_percent
        );
    }

    Ok(QuotaStatus {
        usage_bytes,
        quota_bytes,
        usage_percent: Some(usage_percent),
        warning,
    })
}
