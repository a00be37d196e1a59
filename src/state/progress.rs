use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Archive-wide resume point, persisted as `progress.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressData {
    /// Overall completion, 0 to 100 inclusive
    #[serde(rename = "overall_progress")]
    pub percentage: f64,

    #[serde(rename = "last_subforum", default)]
    pub last_section: String,

    #[serde(default)]
    pub last_topic: String,

    #[serde(default)]
    pub last_page: String,
}

impl ProgressData {
    /// Zero-valued progress written when an archive is initialized
    pub fn zero() -> Self {
        Self {
            percentage: 0.0,
            last_section: String::new(),
            last_topic: String::new(),
            last_page: String::new(),
        }
    }

    /// Checks the domain of every field; returns a description of the first violation
    pub fn check(&self) -> Result<(), String> {
        if !self.percentage.is_finite() || !(0.0..=100.0).contains(&self.percentage) {
            return Err(format!(
                "overall progress {} is outside 0..=100",
                self.percentage
            ));
        }
        Ok(())
    }
}

impl Default for ProgressData {
    fn default() -> Self {
        Self::zero()
    }
}

/// Per-section index, persisted as `metadata/subforum-<ID>/index.json`
///
/// Always written whole; a new write replaces the previous index entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionMetadata {
    pub total_topics: i64,

    /// Topic identifier to number of topic pages
    #[serde(default)]
    pub page_counts: BTreeMap<String, u32>,

    #[serde(default)]
    pub last_updated: String,
}

impl SectionMetadata {
    /// Checks the domain of every field; returns a description of the first violation
    pub fn check(&self) -> Result<(), String> {
        if self.total_topics < 0 {
            return Err(format!(
                "total topic count {} is negative",
                self.total_topics
            ));
        }
        Ok(())
    }
}
