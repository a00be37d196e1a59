//! Storage traits and error types
//!
//! This module defines the trait interface for archive backends and the
//! error type every storage operation reports.

use crate::state::{CompletionSet, ProgressData, SectionMetadata, Topic};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Invalid format in {}: {message}", path.display())]
    InvalidFormat { path: PathBuf, message: String },

    #[error("Empty {component} identifier in {}", path.display())]
    EmptyIdentifier { path: PathBuf, component: &'static str },

    #[error("Permission denied: {}", path.display())]
    Permission { path: PathBuf, source: io::Error },

    #[error("Storage full while writing {}", path.display())]
    StorageFull { path: PathBuf, source: io::Error },

    #[error("IO error at {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// Coarse classification of a `StorageError`
///
/// Callers branch on this to decide between reinitializing (`NotFound`) and
/// aborting (`InvalidFormat`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageErrorKind {
    NotFound,
    InvalidFormat,
    Permission,
    StorageFull,
    Io,
}

impl StorageError {
    /// Classifies an I/O failure at `path`
    pub fn from_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path },
            io::ErrorKind::PermissionDenied => Self::Permission { path, source },
            io::ErrorKind::StorageFull => Self::StorageFull { path, source },
            _ => Self::Io { path, source },
        }
    }

    pub fn invalid_format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> StorageErrorKind {
        match self {
            Self::NotFound { .. } => StorageErrorKind::NotFound,
            Self::InvalidFormat { .. } | Self::EmptyIdentifier { .. } => {
                StorageErrorKind::InvalidFormat
            }
            Self::Permission { .. } => StorageErrorKind::Permission,
            Self::StorageFull { .. } => StorageErrorKind::StorageFull,
            Self::Io { .. } => StorageErrorKind::Io,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == StorageErrorKind::NotFound
    }

    pub fn is_invalid_format(&self) -> bool {
        self.kind() == StorageErrorKind::InvalidFormat
    }

    /// Path the failing operation was working on
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound { path }
            | Self::InvalidFormat { path, .. }
            | Self::EmptyIdentifier { path, .. }
            | Self::Permission { path, .. }
            | Self::StorageFull { path, .. }
            | Self::Io { path, .. } => path,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for archive backend implementations
///
/// Every write replaces a whole file; readers never observe a partial write.
/// No cross-process locking is provided, so two runs must not share a root.
pub trait ArchiveStorage {
    // ===== Layout =====

    /// Creates the archive directories and a zero progress file if absent
    fn initialize(&self) -> StorageResult<()>;

    /// Fails with the first missing directory or file of the layout
    fn validate(&self) -> StorageResult<()>;

    // ===== Progress =====

    fn read_progress(&self) -> StorageResult<ProgressData>;

    fn write_progress(&self, progress: &ProgressData) -> StorageResult<()>;

    // ===== Section Metadata =====

    fn read_section_metadata(&self, section_id: &str) -> StorageResult<SectionMetadata>;

    fn write_section_metadata(
        &self,
        section_id: &str,
        metadata: &SectionMetadata,
    ) -> StorageResult<()>;

    /// Section identifiers that have an index file, sorted
    fn list_sections(&self) -> StorageResult<Vec<String>>;

    // ===== Topics =====

    /// Writes the structured record of a topic under its section
    fn write_topic(&self, topic: &Topic) -> StorageResult<()>;

    fn read_topic(&self, section_id: &str, topic_id: &str) -> StorageResult<Topic>;

    /// Writes one raw topic page (1-based page number)
    fn write_raw_page(
        &self,
        section_id: &str,
        topic_id: &str,
        page: u32,
        html: &str,
    ) -> StorageResult<()>;

    fn has_raw_page(&self, section_id: &str, topic_id: &str, page: u32) -> bool;

    // ===== Work Queue =====

    /// Loads the completion set; a missing file yields an empty set
    fn load_completion(&self) -> StorageResult<CompletionSet>;

    fn save_completion(&self, completion: &CompletionSet) -> StorageResult<()>;
}
