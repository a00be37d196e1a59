//! Raw topic page download
//!
//! Topic pages are addressed by post offset (`start = i * posts_per_page`) and
//! stored as `page-<i + 1>.html`. Pages already on disk are not fetched again,
//! so an interrupted run resumes at page granularity.

use crate::crawler::fetcher::PageFetcher;
use crate::crawler::pagination::OFFSET_PARAM;
use crate::metrics::Metrics;
use crate::state::Topic;
use crate::storage::ArchiveStorage;
use crate::url::with_param;
use crate::Result;
use std::time::Duration;
use url::Url;

/// Page counts for one archived topic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopicArchiveStats {
    pub pages_written: u32,
    pub pages_skipped: u32,
    pub pages_failed: u32,
    /// Highest page number present on disk after this pass
    pub last_page: Option<u32>,
}

/// Downloads the raw pages of discovered topics into the archive
pub struct TopicArchiver<'a, F, S> {
    fetcher: &'a F,
    storage: &'a S,
    metrics: &'a Metrics,
    posts_per_page: u32,
    delay: Duration,
}

impl<'a, F, S> TopicArchiver<'a, F, S>
where
    F: PageFetcher,
    S: ArchiveStorage,
{
    pub fn new(
        fetcher: &'a F,
        storage: &'a S,
        metrics: &'a Metrics,
        posts_per_page: u32,
        delay: Duration,
    ) -> Self {
        Self {
            fetcher,
            storage,
            metrics,
            posts_per_page: posts_per_page.max(1),
            delay,
        }
    }

    /// URL of 1-based page `page` of `topic`
    pub fn page_url(&self, topic_url: &Url, page: u32) -> Url {
        if page <= 1 {
            topic_url.clone()
        } else {
            let offset = u64::from(page - 1) * u64::from(self.posts_per_page);
            with_param(topic_url, OFFSET_PARAM, &offset.to_string())
        }
    }

    /// Stores every page of `topic` that is not yet on disk
    ///
    /// # Errors
    ///
    /// Only storage failures are returned. A page that cannot be fetched is
    /// logged and counted; the next pass retries it.
    pub async fn archive_topic(&self, topic: &Topic) -> Result<TopicArchiveStats> {
        let topic_url = Url::parse(&topic.url)?;
        let page_count = topic.page_count(self.posts_per_page);

        let missing: Vec<u32> = (1..=page_count)
            .filter(|page| !self.storage.has_raw_page(&topic.section_id, &topic.id, *page))
            .collect();

        let mut stats = TopicArchiveStats {
            pages_skipped: page_count - missing.len() as u32,
            ..TopicArchiveStats::default()
        };
        self.metrics.add_expected_pages(missing.len() as u64);

        for page in missing {
            let url = self.page_url(&topic_url, page);
            let html = match self.fetcher.fetch(&url, self.delay).await {
                Ok(html) => {
                    self.metrics.record_http_success();
                    html
                }
                Err(e) => {
                    self.metrics.record_http_failure();
                    tracing::warn!("Skipping page {} of topic {}: {}", page, topic.id, e);
                    stats.pages_failed += 1;
                    continue;
                }
            };

            self.storage
                .write_raw_page(&topic.section_id, &topic.id, page, &html)?;
            self.metrics.record_bytes_archived(html.len());
            stats.pages_written += 1;
        }

        stats.last_page = (1..=page_count)
            .rev()
            .find(|page| self.storage.has_raw_page(&topic.section_id, &topic.id, *page));

        tracing::debug!(
            "Topic {}: {} written, {} already present, {} failed",
            topic.id,
            stats.pages_written,
            stats.pages_skipped,
            stats.pages_failed
        );

        Ok(stats)
    }
}
