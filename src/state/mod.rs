//! State module for tracking discovery progress
//!
//! This module holds the data model shared by the crawler and the storage layer.
//!
//! # Components
//!
//! - `Topic` / `SubForum`: discovered threads and the sections that own them
//! - `ProgressData` / `SectionMetadata`: the persisted resume point and per-section index
//! - `SectionQueue`: the per-run work queue backed by a persisted completion set

mod progress;
mod section_queue;
mod topic;

// Re-export main types
pub use progress::{ProgressData, SectionMetadata};
pub use section_queue::{CompletionSet, SectionQueue, SectionStatus};
pub use topic::{group_by_section, SubForum, Topic};
