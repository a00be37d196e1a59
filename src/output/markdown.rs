//! Markdown summary generation
//!
//! This module renders an archive summary as markdown: progress, per-section
//! coverage, backups and the most recent runs.

use crate::output::{ArchiveSummary, OutputResult};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Writes the markdown rendering of `summary` to `output_path`
///
/// Missing parent directories are created.
pub fn generate_markdown_summary(summary: &ArchiveSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary);

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats an archive summary as markdown
pub fn format_markdown_summary(summary: &ArchiveSummary) -> String {
    let stats = &summary.statistics;
    let mut md = String::new();

    md.push_str("# Threadkeeper Archive Summary\n\n");

    md.push_str("## Archive Information\n\n");
    md.push_str(&format!("- **Generated**: {}\n", summary.generated_at));
    md.push_str(&format!("- **Config Hash**: {}\n", summary.config_hash));
    match &stats.progress {
        Some(progress) => {
            md.push_str(&format!("- **Progress**: {:.1}%\n", progress.percentage));
            if !progress.last_section.is_empty() {
                md.push_str(&format!("- **Last Section**: {}\n", progress.last_section));
            }
        }
        None => md.push_str("- **Progress**: not initialized\n"),
    }
    md.push('\n');

    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!(
        "- **Sections Completed**: {} of {}\n",
        stats.completed_sections,
        summary.configured_sections.len()
    ));
    md.push_str(&format!("- **Topics**: {}\n", stats.total_topics()));
    md.push_str(&format!("- **Topic Pages**: {}\n", stats.total_topic_pages()));
    md.push_str(&format!("- **Archive Size**: {} bytes\n", stats.archive_bytes));
    md.push_str(&format!("- **Backups**: {}\n\n", stats.backups.len()));

    if !stats.sections.is_empty() {
        md.push_str("## Sections\n\n");
        md.push_str("| Section | Name | Topics | Pages | Complete | Updated |\n");
        md.push_str("|---------|------|--------|-------|----------|---------|\n");

        for section in &stats.sections {
            let name = summary
                .configured_sections
                .iter()
                .find(|(id, _)| id == &section.id)
                .map(|(_, name)| name.as_str())
                .unwrap_or("");
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} |\n",
                section.id,
                name,
                section.total_topics,
                section.topic_pages,
                if section.completed { "yes" } else { "no" },
                section.last_updated
            ));
        }
        md.push('\n');
    }

    let pending = summary.pending_sections();
    if !pending.is_empty() {
        md.push_str("## Pending Sections\n\n");
        for id in pending {
            md.push_str(&format!("- {}\n", id));
        }
        md.push('\n');
    }

    if let Some(latest) = stats.backups.first() {
        md.push_str("## Backups\n\n");
        md.push_str(&format!("Latest: `{}`\n\n", latest.name));
    }

    if !summary.recent_runs.is_empty() {
        md.push_str("## Recent Runs\n\n");
        md.push_str("| Run | Finished | Duration (s) | Pages | Topics | Pages/s |\n");
        md.push_str("|-----|----------|--------------|-------|--------|---------|\n");

        for run in &summary.recent_runs {
            md.push_str(&format!(
                "| {} | {} | {:.0} | {} | {} | {:.2} |\n",
                run.run_id,
                run.timestamp,
                run.duration_secs,
                run.pages_archived,
                run.topics_archived,
                run.avg_pages_per_sec
            ));
        }
        md.push('\n');
    }

    md
}
