//! Section page list reconstruction
//!
//! A listing page exposes numbered links to other pages of the same section,
//! each carrying an item offset. The largest offset seen, divided by the
//! number of items per page, gives the index of the last page. No further
//! pages are fetched to find it.

use crate::url::{query_param, same_endpoint, with_param, without_param};
use crate::PlanError;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Query parameter carrying the section identifier
pub const SECTION_PARAM: &str = "f";

/// Query parameter carrying the item offset of a listing page
pub const OFFSET_PARAM: &str = "start";

/// Session parameter some forums append to every link
const SESSION_PARAM: &str = "sid";

/// Link texts of next/previous controls
const CONTROL_TEXTS: &[&str] = &["next", "previous", "prev", "»", "«", "›", "‹", ">", "<"];

/// Class names of next/previous controls (on the link or its container)
const CONTROL_CLASSES: &[&str] = &["next", "prev", "previous"];

/// Most pages one section may span
pub const MAX_PAGES: u64 = 100_000;

/// Derives a section's full page list from one of its listing pages
#[derive(Debug, Clone, Copy)]
pub struct PaginationPlanner {
    items_per_page: u32,
}

impl PaginationPlanner {
    pub fn new(items_per_page: u32) -> Self {
        Self {
            items_per_page: items_per_page.max(1),
        }
    }

    pub fn items_per_page(&self) -> u32 {
        self.items_per_page
    }

    /// Returns every page URL of the section `page_url` belongs to
    ///
    /// The first URL is the canonical first page (no offset parameter) and the
    /// rest follow in ascending offset order without duplicates. A page with
    /// no pagination links yields only the first page.
    ///
    /// # Errors
    ///
    /// Fails if `page_url` cannot carry a query or has no section identifier,
    /// or if an offset on the page implies more than [`MAX_PAGES`] pages.
    pub fn plan(&self, html: &str, page_url: &Url) -> Result<Vec<Url>, PlanError> {
        if page_url.cannot_be_a_base() {
            return Err(PlanError::NotHierarchical(page_url.to_string()));
        }

        let section_id = query_param(page_url, SECTION_PARAM)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PlanError::MissingSectionId(page_url.to_string()))?;

        let first_page = self.first_page_url(page_url);
        let max_offset = self.max_offset(html, page_url, &section_id);

        let step = u64::from(self.items_per_page);
        let last_index = max_offset / step;
        if last_index >= MAX_PAGES {
            return Err(PlanError::TooManyPages {
                url: page_url.to_string(),
                offset: max_offset,
                limit: MAX_PAGES,
            });
        }
        let total_pages = last_index + 1;

        tracing::debug!(
            "Section {} has {} pages (max offset {})",
            section_id,
            total_pages,
            max_offset
        );

        let pages = (0..total_pages)
            .map(|index| {
                if index == 0 {
                    first_page.clone()
                } else {
                    with_param(&first_page, OFFSET_PARAM, &(index * step).to_string())
                }
            })
            .collect();

        Ok(pages)
    }

    /// The section's first page: no offset, no session, no fragment
    fn first_page_url(&self, page_url: &Url) -> Url {
        let mut first = without_param(&without_param(page_url, OFFSET_PARAM), SESSION_PARAM);
        first.set_fragment(None);
        first
    }

    /// Largest numbered-page offset linked from `html` for this section
    fn max_offset(&self, html: &str, page_url: &Url, section_id: &str) -> u64 {
        let document = Html::parse_document(html);
        let Ok(link_selector) = Selector::parse("a[href]") else {
            return 0;
        };

        // The page being read is part of the section even if nothing links to it
        let mut max_offset = query_param(page_url, OFFSET_PARAM)
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(0);
        for link in document.select(&link_selector) {
            if is_control_link(&link) {
                continue;
            }

            let Some(target) = link
                .value()
                .attr("href")
                .and_then(|href| page_url.join(href.trim()).ok())
            else {
                continue;
            };

            if !same_endpoint(&target, page_url)
                || query_param(&target, SECTION_PARAM).as_deref() != Some(section_id)
            {
                continue;
            }

            if let Some(offset) =
                query_param(&target, OFFSET_PARAM).and_then(|value| value.parse::<u64>().ok())
            {
                max_offset = max_offset.max(offset);
            }
        }

        max_offset
    }
}

/// Checks whether a link is a next/previous control rather than a page number
fn is_control_link(link: &ElementRef) -> bool {
    let element = link.value();

    if let Some(rel) = element.attr("rel") {
        if rel
            .split_whitespace()
            .any(|token| token.eq_ignore_ascii_case("next") || token.eq_ignore_ascii_case("prev"))
        {
            return true;
        }
    }

    if has_control_class(element.attr("class")) {
        return true;
    }

    let container_class = link
        .parent()
        .and_then(ElementRef::wrap)
        .and_then(|parent| parent.value().attr("class"));
    if has_control_class(container_class) {
        return true;
    }

    let text = link.text().collect::<String>();
    let text = text.trim().to_lowercase();
    CONTROL_TEXTS.contains(&text.as_str())
}

fn has_control_class(class: Option<&str>) -> bool {
    class.is_some_and(|class| {
        class
            .split_whitespace()
            .any(|name| CONTROL_CLASSES.contains(&name.to_ascii_lowercase().as_str()))
    })
}
