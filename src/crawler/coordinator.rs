//! Archive coordinator - main run orchestration logic
//!
//! This module contains the run loop that coordinates a whole archive pass,
//! including:
//! - Initializing and validating the archive root
//! - Building the section work queue from the persisted completion set
//! - Scanning each pending section and persisting its topics and index
//! - Optional raw topic page download
//! - Periodic backups, retention and quota checks
//! - Recording the run in the metrics history

use crate::config::{Config, SectionEntry};
use crate::crawler::archiver::TopicArchiver;
use crate::crawler::fetcher::{HttpFetcher, PageFetcher};
use crate::crawler::pagination::PaginationPlanner;
use crate::crawler::parser::{PhpbbExtractor, TopicExtractor};
use crate::crawler::reconciler::Reconciler;
use crate::metrics::{append_run, warm_start_rate, Metrics};
use crate::state::{
    group_by_section, CompletionSet, ProgressData, SectionMetadata, SectionQueue, SubForum, Topic,
};
use crate::storage::{
    check_quota, create_backup, prune_backups, ArchiveStorage, FsStorage, QuotaStatus,
};
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, Span};
use url::Url;

/// What a run did
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub run_id: String,
    pub sections_total: usize,
    /// Sections already complete when the run started
    pub sections_skipped: Vec<String>,
    /// Sections completed by this run
    pub sections_completed: Vec<String>,
    /// Sections left pending, with the reason
    pub sections_failed: Vec<(String, String)>,
    pub topics_committed: usize,
    pub pages_failed: usize,
    pub rescan_new: usize,
    pub backups: Vec<PathBuf>,
    pub quota: Option<QuotaStatus>,
}

impl RunReport {
    /// Whether every configured section is now complete
    pub fn is_finished(&self) -> bool {
        self.sections_failed.is_empty()
            && self.sections_skipped.len() + self.sections_completed.len() == self.sections_total
    }
}

/// Outcome of one section
enum SectionResult {
    Completed {
        topics: usize,
        pages_failed: usize,
        rescan_new: usize,
    },
    Failed(String),
}

/// Main archive coordinator structure
pub struct Coordinator<F, E> {
    config: Arc<Config>,
    storage: FsStorage,
    reconciler: Reconciler<F, E>,
    metrics: Arc<Metrics>,
    run_id: String,
    fresh: bool,
    span: Span,
}

impl<F, E> Coordinator<F, E>
where
    F: PageFetcher,
    E: TopicExtractor,
{
    /// Creates a coordinator over the archive root named in `config`
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    /// * `config_hash` - Hash of the configuration file, part of the run id
    /// * `fetcher` - Page fetch capability
    /// * `extractor` - Topic extraction capability
    pub fn new(config: Config, config_hash: &str, fetcher: F, extractor: E) -> Self {
        let run_id = make_run_id(Utc::now(), config_hash);
        let span = tracing::info_span!("run", id = %run_id);
        let metrics = Arc::new(Metrics::new());

        let reconciler = Reconciler::new(
            fetcher,
            extractor,
            PaginationPlanner::new(config.crawler.items_per_page),
            Duration::from_millis(config.crawler.request_delay),
            Arc::clone(&metrics),
        )
        .with_span(span.clone())
        .with_report_every(config.metrics.report_every);

        Self {
            storage: FsStorage::new(&config.archive.root),
            config: Arc::new(config),
            reconciler,
            metrics,
            run_id,
            fresh: false,
            span,
        }
    }

    /// Forgets completed sections before running
    pub fn fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    /// Replaces the run span; the reconciler logs under it as well
    pub fn with_span(mut self, span: Span) -> Self {
        self.reconciler = self.reconciler.with_span(span.clone());
        self.span = span;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn storage(&self) -> &FsStorage {
        &self.storage
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Runs every pending section
    ///
    /// Sections whose first page fails stay pending and are reported; the
    /// run continues with the next one. Storage failures abort the run.
    pub async fn run(&mut self) -> Result<RunReport> {
        let span = self.span.clone();
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&mut self) -> Result<RunReport> {
        self.storage.initialize()?;
        self.storage.validate()?;

        let resume_point = self.storage.read_progress()?;
        tracing::info!(
            "Starting run {} ({:.1}% done, last section '{}')",
            self.run_id,
            resume_point.percentage,
            resume_point.last_section
        );
        self.log_warm_start();

        let mut queue = self.load_queue()?;
        let mut report = RunReport {
            run_id: self.run_id.clone(),
            sections_total: queue.total(),
            ..RunReport::default()
        };

        let pending = queue.pending();
        report.sections_skipped = self
            .config
            .sections
            .iter()
            .map(|s| s.id.clone())
            .filter(|id| !pending.contains(id))
            .collect();
        if !report.sections_skipped.is_empty() {
            tracing::info!(
                "Skipping {} completed sections",
                report.sections_skipped.len()
            );
        }

        let config = Arc::clone(&self.config);
        let backup_every = config.archive.backup_every as usize;

        self.metrics.set_sections_total(pending.len() as u64);
        for section_id in pending {
            let Some(entry) = config.sections.iter().find(|s| s.id == section_id) else {
                continue;
            };
            self.metrics.record_section_started();

            let before = percent(queue.done_count(), queue.total());
            let after = percent(queue.done_count() + 1, queue.total());

            let section_span = tracing::info_span!(parent: &self.span, "section", id = %entry.id);
            let result = self
                .process_section(entry, before, after)
                .instrument(section_span)
                .await?;

            match result {
                SectionResult::Completed {
                    topics,
                    pages_failed,
                    rescan_new,
                } => {
                    queue.mark_done(&entry.id);
                    self.storage.save_completion(&queue.completion())?;

                    report.sections_completed.push(entry.id.clone());
                    report.topics_committed += topics;
                    report.pages_failed += pages_failed;
                    report.rescan_new += rescan_new;

                    if backup_every > 0 && report.sections_completed.len() % backup_every == 0 {
                        self.snapshot(&mut report);
                    }
                }
                SectionResult::Failed(reason) => {
                    report.sections_failed.push((entry.id.clone(), reason));
                }
            }

            self.metrics.log_progress();
        }

        self.snapshot(&mut report);
        self.record_history();

        tracing::info!(
            "Run {} finished: {} sections completed, {} skipped, {} failed, {} topics",
            self.run_id,
            report.sections_completed.len(),
            report.sections_skipped.len(),
            report.sections_failed.len(),
            report.topics_committed
        );

        Ok(report)
    }

    /// Builds the work queue, clearing the completion set on a fresh run
    fn load_queue(&self) -> Result<SectionQueue> {
        let ids = self.config.sections.iter().map(|s| s.id.clone());

        if self.fresh {
            tracing::info!("Fresh run, clearing completed sections");
            let mut queue = SectionQueue::new(ids, CompletionSet::default());
            queue.reset();
            self.storage.save_completion(&queue.completion())?;
            return Ok(queue);
        }

        let completion = self.storage.load_completion()?;
        Ok(SectionQueue::new(ids, completion))
    }

    /// Scans one section and persists its topics, index and progress
    ///
    /// `before` and `after` are the overall percentages while the section is
    /// in progress and once it is committed. Storage failures are returned as
    /// errors; scan failures as `Failed`.
    async fn process_section(
        &self,
        entry: &SectionEntry,
        before: f64,
        after: f64,
    ) -> Result<SectionResult> {
        let first_page = match Url::parse(&entry.url) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("Bad section URL {}: {}", entry.url, e);
                return Ok(SectionResult::Failed(e.to_string()));
            }
        };

        tracing::info!("Scanning section '{}'", entry.name);
        let outcome = match self.reconciler.reconcile(&first_page).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Section left pending: {}", e);
                return Ok(SectionResult::Failed(e.to_string()));
            }
        };

        if !outcome.is_complete() {
            tracing::warn!(
                "Reduced coverage: {} of {} pages could not be read",
                outcome.pages_failed,
                outcome.pages.len()
            );
        }

        let section = build_section(entry, &outcome.topics);
        let mut topics = Vec::with_capacity(section.topics.len());
        for topic in section.topics {
            match self.storage.write_topic(&topic) {
                Ok(()) => topics.push(topic),
                // An identifier the archive cannot name is one bad topic, not a bad run
                Err(e) if e.is_invalid_format() => {
                    tracing::warn!("Skipping topic {:?}: {}", topic.id, e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.metrics.record_topics_committed(topics.len());

        let mut progress = ProgressData {
            percentage: before,
            last_section: entry.id.clone(),
            last_topic: String::new(),
            last_page: outcome.pages.len().to_string(),
        };

        if self.config.crawler.archive_topics {
            self.archive_topics(&topics, &mut progress).await?;
        }

        let metadata = section_metadata(&topics, self.config.crawler.posts_per_page, Utc::now());
        self.storage.write_section_metadata(&entry.id, &metadata)?;

        progress.percentage = after;
        if let Some(last) = topics.last() {
            progress.last_topic.clone_from(&last.id);
        }
        self.storage.write_progress(&progress)?;

        tracing::info!(
            "Section committed: {} topics, {} pages",
            topics.len(),
            outcome.pages.len()
        );

        Ok(SectionResult::Completed {
            topics: topics.len(),
            pages_failed: outcome.pages_failed,
            rescan_new: outcome.rescan_new,
        })
    }

    /// Downloads raw topic pages, recording progress after each topic
    async fn archive_topics(&self, topics: &[Topic], progress: &mut ProgressData) -> Result<()> {
        let archiver = TopicArchiver::new(
            self.reconciler.fetcher(),
            &self.storage,
            &self.metrics,
            self.config.crawler.posts_per_page,
            self.reconciler.delay(),
        );

        for topic in topics {
            let stats = archiver.archive_topic(topic).await?;
            progress.last_topic.clone_from(&topic.id);
            progress.last_page = stats.last_page.map(|p| p.to_string()).unwrap_or_default();
            self.storage.write_progress(progress)?;
        }
        Ok(())
    }

    /// Takes a backup, prunes old ones and checks the quota; never fails the run
    fn snapshot(&self, report: &mut RunReport) {
        let archive = &self.config.archive;
        let root = Path::new(&archive.root);
        let backup_dir = Path::new(&archive.backup_dir);

        match create_backup(root, backup_dir, &archive.backup_prefix) {
            Ok(path) => {
                report.backups.push(path);
                if archive.keep_backups > 0 {
                    if let Err(e) =
                        prune_backups(backup_dir, &archive.backup_prefix, archive.keep_backups)
                    {
                        tracing::warn!("Backup retention failed: {}", e);
                    }
                }
            }
            Err(e) => tracing::warn!("Backup failed: {}", e),
        }

        match check_quota(root, archive.quota_warning_percent, archive.quota_bytes) {
            Ok(status) => report.quota = Some(status),
            Err(e) => tracing::warn!("Quota check failed: {}", e),
        }
    }

    fn log_warm_start(&self) {
        let path = Path::new(&self.config.metrics.history_path);
        match warm_start_rate(path, self.config.metrics.history_window) {
            Ok(Some(rate)) => {
                tracing::info!("Recent runs averaged {:.2} pages/s", rate)
            }
            Ok(None) => tracing::debug!("No run history yet"),
            Err(e) => tracing::warn!("Ignoring run history: {}", e),
        }
    }

    fn record_history(&self) {
        let run = self
            .metrics
            .historical_run(&self.run_id, Utc::now(), Instant::now());
        let path = Path::new(&self.config.metrics.history_path);
        if let Err(e) = append_run(path, &run) {
            tracing::warn!("Could not record run history: {}", e);
        }
    }
}

/// Groups a scan's topics into the section being processed
///
/// Topics attributed to another section are dropped with a warning; the
/// extractor assigns the listing's own section whenever it can.
fn build_section(entry: &SectionEntry, found: &HashMap<String, Topic>) -> SubForum {
    let mut grouped = group_by_section(found.values());
    let topics = grouped.remove(&entry.id).unwrap_or_default();

    for (other, stray) in &grouped {
        tracing::warn!(
            "Dropping {} topics attributed to section {}",
            stray.len(),
            other
        );
    }

    SubForum {
        id: entry.id.clone(),
        name: entry.name.clone(),
        url: entry.url.clone(),
        topic_count: topics.len(),
        topics,
    }
}

/// Builds the section index for a committed topic set
pub fn section_metadata(
    topics: &[Topic],
    posts_per_page: u32,
    updated: DateTime<Utc>,
) -> SectionMetadata {
    SectionMetadata {
        total_topics: topics.len() as i64,
        page_counts: topics
            .iter()
            .map(|t| (t.id.clone(), t.page_count(posts_per_page)))
            .collect(),
        last_updated: updated.to_rfc3339(),
    }
}

/// Run identifier: completion-independent start time plus a config hash prefix
pub fn make_run_id(started: DateTime<Utc>, config_hash: &str) -> String {
    let short: String = config_hash.chars().take(8).collect();
    format!("{}-{}", started.format("%Y%m%dT%H%M%S"), short)
}

fn percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        (done as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }
}

/// Runs a complete archive pass over HTTP
///
/// This is the main entry point. It will:
/// 1. Build the HTTP fetcher from the user agent configuration
/// 2. Initialize the archive root and load the completion set
/// 3. Scan, persist and optionally download each pending section
/// 4. Take a final backup and record the run
pub async fn run_archive(config: Config, config_hash: &str, fresh: bool) -> Result<RunReport> {
    let fetcher = HttpFetcher::from_config(
        &config.user_agent,
        Duration::from_secs(config.crawler.timeout_secs),
    )?;
    let mut coordinator =
        Coordinator::new(config, config_hash, fetcher, PhpbbExtractor::new()).fresh(fresh);
    coordinator.run().await
}
