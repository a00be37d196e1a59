use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single discussion thread discovered on a section listing
///
/// The identifier is unique across the whole archive. Once a topic has been
/// inserted into a scan's accumulator it is never replaced by a later sighting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub section_id: String,
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replies: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub views: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<String>,
    #[serde(default)]
    pub sticky: bool,
    #[serde(default)]
    pub locked: bool,
}

impl Topic {
    /// Creates a topic carrying only the fields every extractor must provide
    pub fn new(
        id: impl Into<String>,
        section_id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            section_id: section_id.into(),
            title: title.into(),
            url: url.into(),
            author: None,
            replies: None,
            views: None,
            last_activity: None,
            sticky: false,
            locked: false,
        }
    }

    /// Number of topic pages implied by the reply count
    ///
    /// The opening post plus `replies` posts are spread over pages of
    /// `posts_per_page`. Topics without a known reply count have one page.
    pub fn page_count(&self, posts_per_page: u32) -> u32 {
        let per_page = posts_per_page.max(1);
        let posts = self.replies.unwrap_or(0).saturating_add(1);
        posts.div_ceil(per_page)
    }
}

/// A forum section together with the topics it owns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubForum {
    pub id: String,
    pub name: String,
    pub url: String,
    pub topic_count: usize,
    pub topics: Vec<Topic>,
}

/// Groups topics by their owning section
///
/// Sections come out ordered by identifier and each section's topics are
/// sorted by topic identifier, independent of the input order.
pub fn group_by_section<'a, I>(topics: I) -> BTreeMap<String, Vec<Topic>>
where
    I: IntoIterator<Item = &'a Topic>,
{
    let mut sections: BTreeMap<String, Vec<Topic>> = BTreeMap::new();
    for topic in topics {
        sections
            .entry(topic.section_id.clone())
            .or_default()
            .push(topic.clone());
    }
    for topics in sections.values_mut() {
        topics.sort_by(|a, b| a.id.cmp(&b.id));
    }
    sections
}
