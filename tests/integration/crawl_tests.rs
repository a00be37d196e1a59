//! Integration tests for the archiver
//!
//! These tests use wiremock to serve phpBB-style listings and topic pages and
//! run the whole discovery and archive cycle end-to-end over HTTP.

use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use threadkeeper::config::{
    ArchiveConfig, Config, CrawlerConfig, MetricsConfig, OutputConfig, SectionEntry,
    UserAgentConfig,
};
use threadkeeper::crawler::{Coordinator, HttpFetcher, PhpbbExtractor};
use threadkeeper::storage::{layout, list_backups, ArchiveStorage};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

/// Matches requests whose URL lacks the given query parameter
struct NoQueryParam(&'static str);

impl Match for NoQueryParam {
    fn matches(&self, request: &Request) -> bool {
        !request.url.query_pairs().any(|(key, _)| key == self.0)
    }
}

/// Creates a test configuration with one entry per section id
fn create_test_config(tmp: &TempDir, base_url: &str, sections: &[&str]) -> Config {
    let path = |name: &str| tmp.path().join(name).to_string_lossy().into_owned();
    Config {
        crawler: CrawlerConfig {
            request_delay: 10, // Very short for testing
            items_per_page: 30,
            posts_per_page: 15,
            archive_topics: false,
            timeout_secs: 5,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestArchiver".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        archive: ArchiveConfig {
            root: path("archive"),
            backup_dir: path("backups"),
            backup_prefix: "backup".to_string(),
            backup_every: 0,
            keep_backups: 0,
            quota_bytes: 0,
            quota_warning_percent: 90.0,
        },
        metrics: MetricsConfig {
            history_path: path("history.jsonl"),
            history_window: 5,
            report_every: 0,
        },
        output: OutputConfig {
            summary_path: path("summary.md"),
        },
        sections: sections
            .iter()
            .map(|id| SectionEntry {
                id: id.to_string(),
                name: format!("Section {id}"),
                url: format!("{base_url}/viewforum.php?f={id}"),
            })
            .collect(),
    }
}

fn coordinator(config: Config) -> Coordinator<HttpFetcher, PhpbbExtractor> {
    let fetcher = HttpFetcher::from_config(&config.user_agent, Duration::from_secs(5))
        .expect("Failed to build HTTP client");
    Coordinator::new(config, "0123456789abcdef", fetcher, PhpbbExtractor::new())
}

/// Renders one listing page: numbered links to `offsets`, a next control, and topic rows
fn listing(section: &str, offsets: &[u32], rows: &[(&str, &str, u32)]) -> String {
    let mut html = String::from("<html><body><div class=\"pagination\"><ul>");
    for offset in offsets {
        html.push_str(&format!(
            "<li><a class=\"button\" href=\"./viewforum.php?f={section}&amp;start={offset}\">{}</a></li>",
            offset / 30 + 1
        ));
    }
    if let Some(first) = offsets.first() {
        html.push_str(&format!(
            "<li class=\"next\"><a rel=\"next\" href=\"./viewforum.php?f={section}&amp;start={first}\">Next</a></li>"
        ));
    }
    html.push_str("</ul></div><ul class=\"topiclist topics\">");
    for (id, title, replies) in rows {
        html.push_str(&format!(
            r#"<li class="row"><dl class="row-item topic_read"><dt><div class="list-inner">
                <a href="./viewtopic.php?f={section}&amp;t={id}&amp;sid=0f0f0f" class="topictitle">{title}</a>
                <div class="topic-poster">by <a href="./memberlist.php?u=2" class="username">alice</a></div>
            </div></dt><dd class="posts">{replies}</dd><dd class="views">99</dd></dl></li>"#
        ));
    }
    html.push_str("</ul></body></html>");
    html
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=UTF-8")
}

/// Mounts the first listing page of `section` (no `start` parameter)
async fn mount_first_page(server: &MockServer, section: &str, body: String) {
    Mock::given(method("GET"))
        .and(path("/viewforum.php"))
        .and(query_param("f", section))
        .and(NoQueryParam("start"))
        .respond_with(html(body))
        .mount(server)
        .await;
}

async fn mount_page(server: &MockServer, section: &str, start: u32, body: String) {
    Mock::given(method("GET"))
        .and(path("/viewforum.php"))
        .and(query_param("f", section))
        .and(query_param("start", start.to_string().as_str()))
        .respond_with(html(body))
        .mount(server)
        .await;
}

async fn requests_for_section(server: &MockServer, section: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| {
            request
                .url
                .query_pairs()
                .any(|(key, value)| key == "f" && value == section)
        })
        .count()
}

#[tokio::test]
async fn test_full_archive_multi_page_section() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let tmp = TempDir::new().unwrap();

    mount_first_page(
        &mock_server,
        "7",
        listing("7", &[30, 60], &[("101", "Welcome", 3), ("102", "Rules", 0)]),
    )
    .await;
    // Topic 101 was bumped and shows up again on page two
    mount_page(
        &mock_server,
        "7",
        30,
        listing("7", &[0, 60], &[("101", "Welcome (bumped)", 4), ("103", "Gear", 16)]),
    )
    .await;
    mount_page(&mock_server, "7", 60, listing("7", &[0, 30], &[("104", "Old news", 1)])).await;

    let config = create_test_config(&tmp, &base_url, &["7"]);
    let mut coordinator = coordinator(config);
    let report = coordinator.run().await.expect("Run failed");

    assert!(report.is_finished());
    assert_eq!(report.sections_completed, vec!["7"]);
    assert_eq!(report.topics_committed, 4);
    assert_eq!(report.pages_failed, 0);
    assert_eq!(report.rescan_new, 0);
    assert_eq!(report.backups.len(), 1);

    let storage = coordinator.storage();
    let index = storage.read_section_metadata("7").unwrap();
    assert_eq!(index.total_topics, 4);
    assert_eq!(
        index.page_counts.keys().collect::<Vec<_>>(),
        vec!["101", "102", "103", "104"]
    );
    // 1 opening post + 16 replies at 15 posts per page
    assert_eq!(index.page_counts["103"], 2);

    let welcome = storage.read_topic("7", "101").unwrap();
    assert_eq!(welcome.title, "Welcome");
    assert_eq!(welcome.url, format!("{base_url}/viewtopic.php?f=7&t=101"));
    assert_eq!(welcome.author.as_deref(), Some("alice"));
    assert_eq!(welcome.replies, Some(3));

    let progress = storage.read_progress().unwrap();
    assert_eq!(progress.percentage, 100.0);
    assert_eq!(progress.last_section, "7");
    assert_eq!(progress.last_topic, "104");

    // Three listing pages plus the first-page rescan
    assert_eq!(requests_for_section(&mock_server, "7").await, 4);

    let backups = list_backups(&tmp.path().join("backups"), "backup").unwrap();
    assert_eq!(backups.len(), 1);
    assert!(backups[0].path.join("progress.json").exists());
}

#[tokio::test]
async fn test_rescan_picks_up_new_topic() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let tmp = TempDir::new().unwrap();

    // First request sees the original listing; the rescan sees a new topic on top
    Mock::given(method("GET"))
        .and(path("/viewforum.php"))
        .and(query_param("f", "7"))
        .and(NoQueryParam("start"))
        .respond_with(html(listing("7", &[30], &[("101", "Welcome", 0)])))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    mount_first_page(
        &mock_server,
        "7",
        listing("7", &[30], &[("200", "Brand new", 0), ("101", "Welcome", 1)]),
    )
    .await;
    mount_page(&mock_server, "7", 30, listing("7", &[0], &[("100", "Older", 0)])).await;

    let config = create_test_config(&tmp, &base_url, &["7"]);
    let mut coordinator = coordinator(config);
    let report = coordinator.run().await.expect("Run failed");

    assert_eq!(report.rescan_new, 1);
    assert_eq!(report.topics_committed, 3);
    assert_eq!(
        coordinator.storage().list_sections().unwrap(),
        vec!["7".to_string()]
    );
    assert!(coordinator.storage().read_topic("7", "200").is_ok());
}

#[tokio::test]
async fn test_failed_section_resumes_next_run() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let tmp = TempDir::new().unwrap();

    mount_first_page(&mock_server, "7", listing("7", &[], &[("101", "Welcome", 0)])).await;
    Mock::given(method("GET"))
        .and(path("/viewforum.php"))
        .and(query_param("f", "9"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&tmp, &base_url, &["7", "9"]);
    let report = coordinator(config.clone()).run().await.expect("Run failed");

    assert!(!report.is_finished());
    assert_eq!(report.sections_completed, vec!["7"]);
    assert_eq!(report.sections_failed.len(), 1);
    assert_eq!(report.sections_failed[0].0, "9");

    let storage = threadkeeper::FsStorage::new(&config.archive.root);
    assert_eq!(storage.read_progress().unwrap().percentage, 50.0);
    assert!(storage.load_completion().unwrap().completed.contains("7"));

    // The forum recovers; only the pending section is fetched again
    mock_server.reset().await;
    mount_first_page(&mock_server, "7", listing("7", &[], &[("101", "Welcome", 0)])).await;
    mount_first_page(&mock_server, "9", listing("9", &[], &[("901", "Market", 2)])).await;

    let report = coordinator(config).run().await.expect("Second run failed");

    assert!(report.is_finished());
    assert_eq!(report.sections_skipped, vec!["7"]);
    assert_eq!(report.sections_completed, vec!["9"]);
    assert_eq!(requests_for_section(&mock_server, "7").await, 0);
    assert_eq!(storage.read_progress().unwrap().percentage, 100.0);
    assert_eq!(storage.read_topic("9", "901").unwrap().title, "Market");
}

#[tokio::test]
async fn test_non_html_listing_leaves_section_pending() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let tmp = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/viewforum.php"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&tmp, &base_url, &["7"]);
    let mut coordinator = coordinator(config);
    let report = coordinator.run().await.expect("Run failed");

    assert_eq!(report.sections_failed.len(), 1);
    assert!(report.sections_completed.is_empty());
    assert!(coordinator.storage().load_completion().unwrap().completed.is_empty());
}

#[tokio::test]
async fn test_archive_topics_downloads_raw_pages() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let tmp = TempDir::new().unwrap();

    mount_first_page(&mock_server, "7", listing("7", &[], &[("101", "Welcome", 20)])).await;
    Mock::given(method("GET"))
        .and(path("/viewtopic.php"))
        .and(query_param("t", "101"))
        .and(NoQueryParam("start"))
        .respond_with(html("<html><body>posts 1-15</body></html>".to_string()))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/viewtopic.php"))
        .and(query_param("t", "101"))
        .and(query_param("start", "15"))
        .respond_with(html("<html><body>posts 16-21</body></html>".to_string()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(&tmp, &base_url, &["7"]);
    config.crawler.archive_topics = true;
    let root = config.archive.root.clone();

    let report = coordinator(config.clone()).run().await.expect("Run failed");
    assert!(report.is_finished());

    let second = layout::raw_page_path(Path::new(&root), "7", "101", 2).unwrap();
    assert_eq!(
        std::fs::read_to_string(second).unwrap(),
        "<html><body>posts 16-21</body></html>"
    );

    let progress = threadkeeper::FsStorage::new(&root).read_progress().unwrap();
    assert_eq!(progress.last_topic, "101");
    assert_eq!(progress.last_page, "2");

    // A fresh pass finds both pages on disk and does not fetch them again
    let report = coordinator(config)
        .fresh(true)
        .run()
        .await
        .expect("Fresh run failed");
    assert!(report.is_finished());
}
