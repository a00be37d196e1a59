//! Topic extraction from section listing pages
//!
//! This module turns the HTML of one listing page into the topics it lists:
//! - Topic identifier (the `t` parameter of the topic link)
//! - Title and canonical topic URL
//! - Author, reply/view counts and last activity when the markup has them
//! - Sticky/announcement and locked flags
//!
//! Rows without a title or identifier are dropped here, so callers only ever
//! see complete topics.

use crate::crawler::pagination::SECTION_PARAM;
use crate::state::Topic;
use crate::url::{canonical_topic_url, query_param};
use crate::ArchiveError;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Query parameter carrying the topic identifier
pub const TOPIC_PARAM: &str = "t";

/// Capability to list the topics found on one listing page
///
/// Identifiers must be stable across runs and comparable as strings. The
/// returned order is the order topics appear on the page.
pub trait TopicExtractor: Send + Sync {
    fn extract(&self, html: &str, page_url: &Url) -> Result<Vec<Topic>, ArchiveError>;
}

/// Extractor for phpBB-style listings (`li.row` rows with an `a.topictitle` link)
#[derive(Debug, Default, Clone, Copy)]
pub struct PhpbbExtractor;

impl PhpbbExtractor {
    pub fn new() -> Self {
        Self
    }
}

/// Parsed CSS selectors used by the extractor
struct Selectors {
    row: Selector,
    title: Selector,
    author: Selector,
    posts: Selector,
    views: Selector,
    last_post: Selector,
    time: Selector,
    item: Selector,
}

impl Selectors {
    fn new(page_url: &Url) -> Result<Self, ArchiveError> {
        let parse = |css: &str| {
            Selector::parse(css).map_err(|e| ArchiveError::Extract {
                url: page_url.to_string(),
                message: format!("bad selector '{}': {:?}", css, e),
            })
        };

        Ok(Self {
            row: parse("li.row")?,
            title: parse("a.topictitle")?,
            author: parse(
                ".topic-poster .username, .topic-poster .username-coloured, \
                 dt .username, dt .username-coloured",
            )?,
            posts: parse("dd.posts")?,
            views: parse("dd.views")?,
            last_post: parse("dd.lastpost")?,
            time: parse("time[datetime]")?,
            item: parse("dl")?,
        })
    }
}

impl TopicExtractor for PhpbbExtractor {
    fn extract(&self, html: &str, page_url: &Url) -> Result<Vec<Topic>, ArchiveError> {
        let selectors = Selectors::new(page_url)?;
        let document = Html::parse_document(html);
        let page_section = query_param(page_url, SECTION_PARAM).filter(|id| !id.is_empty());

        let mut topics = Vec::new();
        let mut saw_rows = false;

        for row in document.select(&selectors.row) {
            saw_rows = true;
            let Some(link) = row.select(&selectors.title).next() else {
                continue;
            };
            if let Some(mut topic) = topic_from_link(&link, page_url, page_section.as_deref()) {
                fill_details(&mut topic, &row, &selectors);
                topics.push(topic);
            }
        }

        // Listings without row markup still carry the title links
        if !saw_rows {
            for link in document.select(&selectors.title) {
                if let Some(topic) = topic_from_link(&link, page_url, page_section.as_deref()) {
                    topics.push(topic);
                }
            }
        }

        tracing::trace!("Extracted {} topics from {}", topics.len(), page_url);
        Ok(topics)
    }
}

/// Builds the required topic fields from its title link
fn topic_from_link(link: &ElementRef, page_url: &Url, page_section: Option<&str>) -> Option<Topic> {
    let title = collapse_whitespace(&link.text().collect::<String>());
    if title.is_empty() {
        return None;
    }

    let href = link.value().attr("href")?;
    let target = page_url.join(href.trim()).ok()?;

    let id = query_param(&target, TOPIC_PARAM).filter(|id| !id.is_empty())?;
    let section_id = page_section
        .map(str::to_string)
        .or_else(|| query_param(&target, SECTION_PARAM).filter(|id| !id.is_empty()))?;

    let url = canonical_topic_url(&target);
    Some(Topic::new(id, section_id, title, url.to_string()))
}

/// Fills the optional fields from the rest of the row
fn fill_details(topic: &mut Topic, row: &ElementRef, selectors: &Selectors) {
    topic.author = row
        .select(&selectors.author)
        .next()
        .map(|e| collapse_whitespace(&e.text().collect::<String>()))
        .filter(|name| !name.is_empty());

    topic.replies = row
        .select(&selectors.posts)
        .next()
        .and_then(|e| leading_number(&e.text().collect::<String>()));

    topic.views = row
        .select(&selectors.views)
        .next()
        .and_then(|e| leading_number(&e.text().collect::<String>()));

    topic.last_activity = row.select(&selectors.last_post).next().and_then(|cell| {
        cell.select(&selectors.time)
            .next()
            .and_then(|t| t.value().attr("datetime").map(str::to_string))
            .or_else(|| Some(collapse_whitespace(&cell.text().collect::<String>())))
            .filter(|text| !text.is_empty())
    });

    let mut classes: Vec<&str> = row.value().classes().collect();
    if let Some(item) = row.select(&selectors.item).next() {
        classes.extend(item.value().classes());
    }

    topic.sticky = classes.iter().any(|class| {
        class.starts_with("sticky") || class.starts_with("announce") || class.starts_with("global")
    });
    topic.locked = classes.iter().any(|class| class.contains("locked"));
}

/// Parses the number at the start of a cell such as `"1,234 Replies"`
fn leading_number(text: &str) -> Option<u32> {
    let digits: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
