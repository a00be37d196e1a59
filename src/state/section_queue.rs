use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Status of a section within a run's work queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionStatus {
    Pending,
    Done,
}

/// Work queue over the configured sections plus the persisted completion set
///
/// The queue order is the configuration order. The completion set is what
/// survives between runs (`completed-sections.json`); a section enters it only
/// after its index and progress were written.
#[derive(Debug, Clone, Default)]
pub struct SectionQueue {
    order: Vec<String>,
    completed: BTreeSet<String>,
}

/// On-disk shape of the completion set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSet {
    pub completed: BTreeSet<String>,
}

impl SectionQueue {
    /// Builds a queue over `sections`, treating ids in `completion` as done
    ///
    /// Completed ids that are no longer configured are dropped.
    pub fn new<I, S>(sections: I, completion: CompletionSet) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let order: Vec<String> = sections.into_iter().map(Into::into).collect();
        let completed = completion
            .completed
            .into_iter()
            .filter(|id| order.contains(id))
            .collect();
        Self { order, completed }
    }

    /// Returns the status of a section, or `None` for an unknown id
    pub fn status(&self, section_id: &str) -> Option<SectionStatus> {
        if !self.order.iter().any(|id| id == section_id) {
            return None;
        }
        if self.completed.contains(section_id) {
            Some(SectionStatus::Done)
        } else {
            Some(SectionStatus::Pending)
        }
    }

    /// Pending section ids in queue order
    pub fn pending(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| !self.completed.contains(*id))
            .cloned()
            .collect()
    }

    /// Marks a section done; returns false if the id is not queued
    pub fn mark_done(&mut self, section_id: &str) -> bool {
        if self.order.iter().any(|id| id == section_id) {
            self.completed.insert(section_id.to_string());
            true
        } else {
            false
        }
    }

    /// Forgets every completion
    pub fn reset(&mut self) {
        self.completed.clear();
    }

    pub fn total(&self) -> usize {
        self.order.len()
    }

    pub fn done_count(&self) -> usize {
        self.completed.len()
    }

    pub fn is_finished(&self) -> bool {
        self.completed.len() == self.order.len()
    }

    /// Snapshot of the completion set for persistence
    pub fn completion(&self) -> CompletionSet {
        CompletionSet {
            completed: self.completed.clone(),
        }
    }
}
