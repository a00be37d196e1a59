//! Configuration module for Threadkeeper
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use threadkeeper::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("threadkeeper.toml")).unwrap();
//! println!("Archiving {} sections", config.sections.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ArchiveConfig, Config, CrawlerConfig, MetricsConfig, OutputConfig, SectionEntry,
    UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
