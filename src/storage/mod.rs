//! Storage module for the on-disk archive
//!
//! This module owns everything that touches the archive root, including:
//! - The directory layout and path construction/parsing
//! - Progress, section index, topic and completion-set persistence
//! - Timestamped backups, backup retention and quota checks
//! - Recursive directory copy and size measurement
//!
//! All writes replace whole files through a temporary sibling and a rename.

mod backup;
mod copy;
mod fs;
pub mod layout;
mod traits;

pub use backup::{
    check_quota, create_backup, create_backup_at, list_backups, prune_backups, BackupEntry,
    QuotaStatus, BACKUP_TIMESTAMP_FORMAT,
};
pub use copy::copy_dir_recursive;
pub use fs::{directory_size, FsStorage};
pub use traits::{ArchiveStorage, StorageError, StorageErrorKind, StorageResult};
