//! Statistics gathered from an archive root
//!
//! This module reads the persisted progress, section indexes, completion set
//! and backups of an archive and displays them.

use crate::output::OutputResult;
use crate::state::{CompletionSet, ProgressData};
use crate::storage::{directory_size, list_backups, ArchiveStorage, BackupEntry, FsStorage};
use std::path::Path;

/// Per-section figures from its index file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSummary {
    pub id: String,
    pub total_topics: i64,
    /// Sum of the page counts of every topic
    pub topic_pages: u64,
    pub last_updated: String,
    pub completed: bool,
}

/// Archive statistics summary
#[derive(Debug, Clone)]
pub struct ArchiveStatistics {
    /// `None` if the archive was never initialized
    pub progress: Option<ProgressData>,

    /// Sections with an index, sorted by identifier
    pub sections: Vec<SectionSummary>,

    /// Sections recorded as complete
    pub completed_sections: usize,

    /// Backups, newest first
    pub backups: Vec<BackupEntry>,

    /// Size of the archive root in bytes
    pub archive_bytes: u64,
}

impl ArchiveStatistics {
    pub fn total_topics(&self) -> i64 {
        self.sections.iter().map(|s| s.total_topics).sum()
    }

    pub fn total_topic_pages(&self) -> u64 {
        self.sections.iter().map(|s| s.topic_pages).sum()
    }
}

/// Loads statistics from an archive root and its backup directory
///
/// A root that does not exist yet yields empty statistics. Unreadable or
/// malformed files are reported as errors.
pub fn load_statistics(
    root: &Path,
    backup_dir: &Path,
    backup_prefix: &str,
) -> OutputResult<ArchiveStatistics> {
    let backups = list_backups(backup_dir, backup_prefix)?;

    if !root.exists() {
        return Ok(ArchiveStatistics {
            progress: None,
            sections: Vec::new(),
            completed_sections: 0,
            backups,
            archive_bytes: 0,
        });
    }

    let storage = FsStorage::new(root);

    let progress = match storage.read_progress() {
        Ok(progress) => Some(progress),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e.into()),
    };

    let completion: CompletionSet = storage.load_completion()?;

    let section_ids = match storage.list_sections() {
        Ok(ids) => ids,
        Err(e) if e.is_not_found() => Vec::new(),
        Err(e) => return Err(e.into()),
    };

    let mut sections = Vec::with_capacity(section_ids.len());
    for id in section_ids {
        let metadata = storage.read_section_metadata(&id)?;
        sections.push(SectionSummary {
            completed: completion.completed.contains(&id),
            id,
            total_topics: metadata.total_topics,
            topic_pages: metadata.page_counts.values().map(|&p| u64::from(p)).sum(),
            last_updated: metadata.last_updated,
        });
    }

    Ok(ArchiveStatistics {
        progress,
        sections,
        completed_sections: completion.completed.len(),
        backups,
        archive_bytes: directory_size(root)?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &ArchiveStatistics) {
    println!("=== Archive Statistics ===\n");

    println!("Progress:");
    match &stats.progress {
        Some(progress) => {
            println!("  Overall: {:.1}%", progress.percentage);
            println!("  Last section: {}", or_dash(&progress.last_section));
            println!("  Last topic: {}", or_dash(&progress.last_topic));
            println!("  Last page: {}", or_dash(&progress.last_page));
        }
        None => println!("  Archive not initialized"),
    }
    println!();

    println!("Overview:");
    println!("  Sections indexed: {}", stats.sections.len());
    println!("  Sections completed: {}", stats.completed_sections);
    println!("  Topics: {}", stats.total_topics());
    println!("  Topic pages: {}", stats.total_topic_pages());
    println!("  Archive size: {} bytes", stats.archive_bytes);
    println!();

    if !stats.sections.is_empty() {
        println!("Sections:");
        for section in &stats.sections {
            println!(
                "  {} {}: {} topics, {} pages (updated {})",
                if section.completed { "[x]" } else { "[ ]" },
                section.id,
                section.total_topics,
                section.topic_pages,
                section.last_updated
            );
        }
        println!();
    }

    println!("Backups ({}):", stats.backups.len());
    for backup in stats.backups.iter().take(10) {
        println!("  - {}", backup.name);
    }
    if stats.backups.len() > 10 {
        println!("  ... and {} more", stats.backups.len() - 10);
    }
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}
