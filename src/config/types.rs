use serde::Deserialize;

/// Main configuration structure for Threadkeeper
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default, rename = "section")]
    pub sections: Vec<SectionEntry>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Pause before every request (milliseconds)
    #[serde(rename = "request-delay")]
    pub request_delay: u64,

    /// Topics listed per section page; drives the pagination offsets
    #[serde(rename = "items-per-page", default = "default_items_per_page")]
    pub items_per_page: u32,

    /// Posts shown per topic page; drives the raw topic page offsets
    #[serde(rename = "posts-per-page", default = "default_posts_per_page")]
    pub posts_per_page: u32,

    /// Whether raw topic pages are downloaded after discovery
    #[serde(rename = "archive-topics", default)]
    pub archive_topics: bool,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Archive location, backup and quota configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    /// Archive root directory
    pub root: String,

    /// Directory under which timestamped backups are created
    #[serde(rename = "backup-dir")]
    pub backup_dir: String,

    /// Name prefix of backup directories
    #[serde(rename = "backup-prefix", default = "default_backup_prefix")]
    pub backup_prefix: String,

    /// Completed sections between two backups (0 disables periodic backups)
    #[serde(rename = "backup-every", default = "default_backup_every")]
    pub backup_every: u32,

    /// Number of backups to retain (0 keeps all)
    #[serde(rename = "keep-backups", default)]
    pub keep_backups: usize,

    /// Disk quota for the archive root in bytes; zero or negative disables it
    #[serde(rename = "quota-bytes", default)]
    pub quota_bytes: i64,

    /// Usage percentage at which a quota warning is raised
    #[serde(rename = "quota-warning-percent", default = "default_quota_warning")]
    pub quota_warning_percent: f64,
}

/// Throughput tracking configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Append-only log of completed runs (JSON lines)
    #[serde(rename = "history-path", default = "default_history_path")]
    pub history_path: String,

    /// Number of recent runs averaged for the warm-start estimate
    #[serde(rename = "history-window", default = "default_history_window")]
    pub history_window: usize,

    /// Fetched pages between two progress log lines
    #[serde(rename = "report-every", default = "default_report_every")]
    pub report_every: u64,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the markdown summary file
    #[serde(rename = "summary-path", default = "default_summary_path")]
    pub summary_path: String,
}

/// A forum section to index
#[derive(Debug, Clone, Deserialize)]
pub struct SectionEntry {
    /// Section identifier (the listing's `f` parameter)
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Listing URL of the first page
    pub url: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            history_path: default_history_path(),
            history_window: default_history_window(),
            report_every: default_report_every(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            summary_path: default_summary_path(),
        }
    }
}

fn default_items_per_page() -> u32 {
    30
}

fn default_posts_per_page() -> u32 {
    15
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_backup_prefix() -> String {
    "backup".to_string()
}

fn default_backup_every() -> u32 {
    5
}

fn default_quota_warning() -> f64 {
    90.0
}

fn default_history_path() -> String {
    "./metrics-history.jsonl".to_string()
}

fn default_history_window() -> usize {
    5
}

fn default_report_every() -> u64 {
    10
}

fn default_summary_path() -> String {
    "./archive-summary.md".to_string()
}
