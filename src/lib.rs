//! Threadkeeper: a resumable forum topic archiver
//!
//! This crate discovers the topics listed across the sections of a paginated
//! web forum, reconciles a full scan with a first-page rescan, and persists the
//! result into an on-disk archive that survives interruption and can be backed up.

pub mod config;
pub mod crawler;
pub mod metrics;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Threadkeeper operations
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Pagination error: {0}")]
    Plan(#[from] PlanError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Extraction failed for {url}: {message}")]
    Extract { url: String, message: String },

    #[error("Metrics error: {0}")]
    Metrics(#[from] metrics::MetricsError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors raised while deriving a section's page list
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("Listing URL has no section identifier: {0}")]
    MissingSectionId(String),

    #[error("Listing URL cannot carry query parameters: {0}")]
    NotHierarchical(String),

    #[error("Listing {url} links to offset {offset}, beyond the {limit} page limit")]
    TooManyPages { url: String, offset: u64, limit: u64 },
}

/// Result type alias for Threadkeeper operations
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use state::{ProgressData, SectionMetadata, SubForum, Topic};
pub use storage::{FsStorage, StorageError, StorageErrorKind};
