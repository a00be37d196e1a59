//! Two-pass section scan
//!
//! A full scan walks every planned page of a section once and merges the
//! topics it finds, first sighting wins. A rescan of the first page then
//! catches topics bumped to the top while the full scan was running.
//!
//! Only the first page is rescanned. Topics that moved between later pages or
//! were deleted during the scan are not revisited.

use crate::crawler::fetcher::PageFetcher;
use crate::crawler::pagination::PaginationPlanner;
use crate::crawler::parser::TopicExtractor;
use crate::metrics::Metrics;
use crate::state::Topic;
use crate::Result;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, Span};
use url::Url;

/// Result of scanning one section
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Planned page list, first page first
    pub pages: Vec<Url>,
    /// Deduplicated topics keyed by identifier
    pub topics: HashMap<String, Topic>,
    /// Topics seen for the first time on the rescan
    pub rescan_new: usize,
    /// Pages of the full scan that could not be fetched or extracted
    pub pages_failed: usize,
}

impl ScanOutcome {
    /// Topics sorted by identifier
    pub fn sorted_topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.topics.values().cloned().collect();
        topics.sort_by(|a, b| a.id.cmp(&b.id));
        topics
    }

    /// Whether every planned page contributed to the result
    pub fn is_complete(&self) -> bool {
        self.pages_failed == 0
    }
}

/// Runs the full scan and first-page rescan of a section
pub struct Reconciler<F, E> {
    fetcher: F,
    extractor: E,
    planner: PaginationPlanner,
    delay: Duration,
    metrics: Arc<Metrics>,
    report_every: u64,
    span: Span,
}

impl<F, E> Reconciler<F, E>
where
    F: PageFetcher,
    E: TopicExtractor,
{
    pub fn new(
        fetcher: F,
        extractor: E,
        planner: PaginationPlanner,
        delay: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            planner,
            delay,
            metrics,
            report_every: 0,
            span: Span::current(),
        }
    }

    /// Parent span of every log line this reconciler emits
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Logs a progress line every `pages` processed pages (0 disables it)
    pub fn with_report_every(mut self, pages: u64) -> Self {
        self.report_every = pages;
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Scans the section whose listing starts at `first_page`
    ///
    /// # Errors
    ///
    /// Fails only if the first page cannot be fetched or planned. Failures on
    /// later pages are logged and counted in `pages_failed`.
    pub async fn reconcile(&self, first_page: &Url) -> Result<ScanOutcome> {
        let span = tracing::info_span!(parent: &self.span, "scan", url = %first_page);
        self.scan(first_page).instrument(span).await
    }

    async fn scan(&self, first_page: &Url) -> Result<ScanOutcome> {
        let html = match self.fetcher.fetch(first_page, self.delay).await {
            Ok(html) => {
                self.metrics.record_http_success();
                html
            }
            Err(e) => {
                self.metrics.record_http_failure();
                tracing::error!("First page failed: {}", e);
                return Err(e.into());
            }
        };

        let pages = self.planner.plan(&html, first_page)?;
        // Every planned page plus the rescan
        self.metrics.add_expected_pages(pages.len() as u64 + 1);
        tracing::info!("Planned {} pages", pages.len());

        let mut outcome = ScanOutcome {
            pages,
            ..ScanOutcome::default()
        };

        match self.extractor.extract(&html, &outcome.pages[0]) {
            Ok(topics) => {
                self.merge(&mut outcome.topics, topics);
            }
            Err(e) => {
                tracing::warn!("Skipping topics of first page: {}", e);
                outcome.pages_failed += 1;
            }
        }

        for page in outcome.pages.iter().skip(1) {
            match self.scan_page(page).await {
                Some(topics) => {
                    self.merge(&mut outcome.topics, topics);
                }
                None => outcome.pages_failed += 1,
            }
            self.maybe_report();
        }

        if let Some(topics) = self.scan_page(&outcome.pages[0]).await {
            outcome.rescan_new = self.merge(&mut outcome.topics, topics);
        }

        tracing::info!(
            "Scan found {} topics ({} new on rescan, {} of {} pages failed)",
            outcome.topics.len(),
            outcome.rescan_new,
            outcome.pages_failed,
            outcome.pages.len()
        );

        Ok(outcome)
    }

    /// Fetches and extracts one page; `None` if either step failed
    async fn scan_page(&self, page: &Url) -> Option<Vec<Topic>> {
        let html = match self.fetcher.fetch(page, self.delay).await {
            Ok(html) => {
                self.metrics.record_http_success();
                html
            }
            Err(e) => {
                self.metrics.record_http_failure();
                tracing::warn!("Skipping page: {}", e);
                return None;
            }
        };

        match self.extractor.extract(&html, page) {
            Ok(topics) => Some(topics),
            Err(e) => {
                tracing::warn!("Skipping page {}: {}", page, e);
                None
            }
        }
    }

    /// Inserts unseen topics; returns how many were new
    fn merge(&self, accumulator: &mut HashMap<String, Topic>, topics: Vec<Topic>) -> usize {
        self.metrics.record_topics_found(topics.len());

        let mut added = 0;
        for topic in topics {
            if let Entry::Vacant(slot) = accumulator.entry(topic.id.clone()) {
                slot.insert(topic);
                added += 1;
            }
        }
        added
    }

    fn maybe_report(&self) {
        if self.report_every == 0 {
            return;
        }
        if self.metrics.counters().pages_processed() % self.report_every == 0 {
            self.metrics.log_progress();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::crawler::fetcher::FetchError;
    use crate::ArchiveError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Mutex;

    pub(crate) const FIRST: &str = "https://forum.example.com/viewforum.php?f=7";

    /// Serves canned bodies per URL; the last body for a URL repeats
    #[derive(Default)]
    pub(crate) struct FakeFetcher {
        responses: Mutex<HashMap<String, VecDeque<Option<String>>>>,
        pub(crate) requests: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        pub(crate) fn page(self, url: &str, body: &str) -> Self {
            self.push(url, Some(body.to_string()))
        }

        pub(crate) fn failing(self, url: &str) -> Self {
            self.push(url, None)
        }

        fn push(self, url: &str, body: Option<String>) -> Self {
            self.responses
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push_back(body);
            self
        }

        pub(crate) fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &Url, _delay: Duration) -> std::result::Result<String, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());

            let mut responses = self.responses.lock().unwrap();
            let queue = responses.get_mut(url.as_str());
            let body = match queue {
                Some(queue) if queue.len() > 1 => queue.pop_front().flatten(),
                Some(queue) => queue.front().cloned().flatten(),
                None => None,
            };

            body.ok_or_else(|| FetchError::HttpError {
                url: url.to_string(),
                status_code: 500,
            })
        }
    }

    /// Reads `topic <id> <title>` lines; a body of `BROKEN` fails extraction
    ///
    /// Topics belong to the section named by the page's `f` parameter.
    pub(crate) struct LineExtractor;

    impl TopicExtractor for LineExtractor {
        fn extract(&self, html: &str, page_url: &Url) -> Result<Vec<Topic>> {
            if html.trim() == "BROKEN" {
                return Err(ArchiveError::Extract {
                    url: page_url.to_string(),
                    message: "broken".to_string(),
                });
            }
            let section = crate::url::query_param(page_url, "f").unwrap_or_default();
            Ok(html
                .lines()
                .filter_map(|line| line.trim().strip_prefix("topic "))
                .filter_map(|rest| rest.split_once(' '))
                .map(|(id, title)| {
                    Topic::new(
                        id,
                        section.as_str(),
                        title,
                        format!("https://forum.example.com/viewtopic.php?t={id}"),
                    )
                })
                .collect())
        }
    }

    pub(crate) fn page_url(start: u32) -> String {
        if start == 0 {
            FIRST.to_string()
        } else {
            format!("{FIRST}&start={start}")
        }
    }

    pub(crate) fn first_page(max_start: u32, topics: &str) -> String {
        let mut body = String::new();
        let mut start = 30;
        while start <= max_start {
            body.push_str(&format!(
                "<a href=\"viewforum.php?f=7&amp;start={start}\">{}</a>\n",
                start / 30 + 1
            ));
            start += 30;
        }
        body.push_str(topics);
        body
    }

    fn reconciler(fetcher: FakeFetcher) -> Reconciler<FakeFetcher, LineExtractor> {
        Reconciler::new(
            fetcher,
            LineExtractor,
            PaginationPlanner::new(30),
            Duration::ZERO,
            Arc::new(Metrics::new()),
        )
    }

    fn ids(outcome: &ScanOutcome) -> Vec<String> {
        outcome.sorted_topics().into_iter().map(|t| t.id).collect()
    }

    #[tokio::test]
    async fn test_bumped_topic_is_not_counted_twice() {
        let fetcher = FakeFetcher::default()
            .page(&page_url(0), &first_page(60, "topic t1 First title"))
            .page(&page_url(0), &first_page(60, "topic t1 Bumped title"))
            .page(&page_url(30), "topic t2 Second")
            .page(&page_url(60), "");

        let r = reconciler(fetcher);
        let outcome = r.reconcile(&Url::parse(FIRST).unwrap()).await.unwrap();

        assert_eq!(outcome.pages.len(), 3);
        assert_eq!(ids(&outcome), vec!["t1", "t2"]);
        assert_eq!(outcome.rescan_new, 0);
        assert_eq!(outcome.topics["t1"].title, "First title");
        assert!(outcome.is_complete());

        assert_eq!(
            r.fetcher().requests(),
            vec![page_url(0), page_url(30), page_url(60), page_url(0)]
        );
    }

    #[tokio::test]
    async fn test_first_sighting_wins_across_pages() {
        let fetcher = FakeFetcher::default()
            .page(&page_url(0), &first_page(30, "topic a From page one"))
            .page(&page_url(30), "topic a From page two\ntopic b Only here");

        let outcome = reconciler(fetcher)
            .reconcile(&Url::parse(FIRST).unwrap())
            .await
            .unwrap();

        assert_eq!(outcome.topics.len(), 2);
        assert_eq!(outcome.topics["a"].title, "From page one");
    }

    #[tokio::test]
    async fn test_rescan_counts_new_topics() {
        let fetcher = FakeFetcher::default()
            .page(&page_url(0), &first_page(30, "topic t1 One"))
            .page(&page_url(0), &first_page(30, "topic t9 Fresh\ntopic t1 One"))
            .page(&page_url(30), "topic t2 Two");

        let outcome = reconciler(fetcher)
            .reconcile(&Url::parse(FIRST).unwrap())
            .await
            .unwrap();

        assert_eq!(ids(&outcome), vec!["t1", "t2", "t9"]);
        assert_eq!(outcome.rescan_new, 1);
    }

    #[tokio::test]
    async fn test_failed_pages_are_skipped() {
        let fetcher = FakeFetcher::default()
            .page(&page_url(0), &first_page(90, "topic t1 One"))
            .failing(&page_url(30))
            .page(&page_url(60), "BROKEN")
            .page(&page_url(90), "topic t4 Four");

        let r = reconciler(fetcher);
        let outcome = r.reconcile(&Url::parse(FIRST).unwrap()).await.unwrap();

        assert_eq!(ids(&outcome), vec!["t1", "t4"]);
        assert_eq!(outcome.pages_failed, 2);
        assert!(!outcome.is_complete());

        let counters = r.metrics().counters();
        assert_eq!(counters.http_failures, 1);
        assert_eq!(counters.http_successes, 4);
        assert_eq!(counters.expected_pages, Some(5));
    }

    #[tokio::test]
    async fn test_failed_rescan_keeps_full_scan() {
        let fetcher = FakeFetcher::default()
            .page(&page_url(0), &first_page(0, "topic t1 One"))
            .failing(&page_url(0));

        let outcome = reconciler(fetcher)
            .reconcile(&Url::parse(FIRST).unwrap())
            .await
            .unwrap();

        assert_eq!(ids(&outcome), vec!["t1"]);
        assert_eq!(outcome.rescan_new, 0);
        assert_eq!(outcome.pages_failed, 0);
    }

    #[tokio::test]
    async fn test_first_page_failure_is_fatal() {
        let fetcher = FakeFetcher::default().failing(&page_url(0));
        let err = reconciler(fetcher)
            .reconcile(&Url::parse(FIRST).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_unplannable_first_page_is_fatal() {
        let url = "https://forum.example.com/viewforum.php?id=7";
        let fetcher = FakeFetcher::default().page(url, "topic t1 One");
        let err = reconciler(fetcher)
            .reconcile(&Url::parse(url).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Plan(_)));
    }

    /// Collects formatted log output for one test
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_logs_go_to_injected_span() {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let fetcher = FakeFetcher::default().page(&page_url(0), &first_page(0, "topic t1 One"));
        let r = reconciler(fetcher).with_span(tracing::info_span!("section", id = "7"));
        r.reconcile(&Url::parse(FIRST).unwrap()).await.unwrap();

        let logs = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("section{"), "{logs}");
        assert!(logs.contains(":scan{"), "{logs}");
        assert!(logs.contains("Scan found 1 topics"), "{logs}");
    }
}
