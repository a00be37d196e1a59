//! Crawler module for section discovery and topic archiving
//!
//! This module contains the core discovery logic, including:
//! - Page list reconstruction from a single listing page
//! - HTTP fetching with politeness pacing
//! - Topic extraction from listing HTML
//! - The two-pass section scan
//! - Raw topic page download
//! - Overall run coordination

mod archiver;
mod coordinator;
mod fetcher;
mod pagination;
mod parser;
mod reconciler;

pub use archiver::{TopicArchiveStats, TopicArchiver};
pub use coordinator::{make_run_id, run_archive, section_metadata, Coordinator, RunReport};
pub use fetcher::{build_http_client, FetchError, HttpFetcher, PageFetcher};
pub use pagination::{PaginationPlanner, OFFSET_PARAM, SECTION_PARAM};
pub use parser::{PhpbbExtractor, TopicExtractor, TOPIC_PARAM};
pub use reconciler::{Reconciler, ScanOutcome};
