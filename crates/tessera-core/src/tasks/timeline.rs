//! Deduplicated per-task step timeline

use super::model::ActivityLogEntry;
use std::collections::{HashMap, HashSet};

/// Step log of one task, one displayed entry per step.
///
/// The displayed entry for a step is the most recently merged one, except
/// that a `started` entry never replaces a terminal one. Entries whose id was
/// already merged are ignored.
#[derive(Debug, Clone, Default)]
pub struct StepTimeline {
    entries: Vec<ActivityLogEntry>,
    by_step: HashMap<String, usize>,
    seen_ids: HashSet<String>,
}

impl StepTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge entries in delivery order; returns how many changed the view
    pub fn merge(&mut self, entries: impl IntoIterator<Item = ActivityLogEntry>) -> usize {
        let mut changed = 0;
        for entry in entries {
            if self.merge_one(entry) {
                changed += 1;
            }
        }
        changed
    }

    fn merge_one(&mut self, entry: ActivityLogEntry) -> bool {
        if !self.seen_ids.insert(entry.id.clone()) {
            return false;
        }

        match self.by_step.get(&entry.step) {
            Some(&index) => {
                let current = &mut self.entries[index];
                if !entry.status.is_terminal() && current.status.is_terminal() {
                    tracing::debug!(
                        task_id = %entry.task_id,
                        step = %entry.step,
                        kept = %current.status,
                        "ignoring regression to started"
                    );
                    return false;
                }
                *current = entry;
            }
            None => {
                self.by_step.insert(entry.step.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
        true
    }

    /// Displayed entries, in the order their steps first appeared
    pub fn entries(&self) -> &[ActivityLogEntry] {
        &self.entries
    }

    pub fn get(&self, step: &str) -> Option<&ActivityLogEntry> {
        self.by_step.get(step).map(|&index| &self.entries[index])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Deduplicate a full log in one pass
pub fn dedupe_steps(entries: impl IntoIterator<Item = ActivityLogEntry>) -> Vec<ActivityLogEntry> {
    let mut timeline = StepTimeline::new();
    timeline.merge(entries);
    timeline.entries
}
