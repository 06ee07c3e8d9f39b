//! Authoritative task collection and its derived views

use super::filter::StatusFilter;
use super::model::{ActivityLogEntry, Task, TaskStatus, TaskTotals};
use super::rollup::{AgentRollup, compute_rollups};
use super::timeline::StepTimeline;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;

/// What applying a snapshot changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDelta {
    pub version: u64,
    /// Tasks that just moved into `running`; their logs should be fetched
    pub entered_running: Vec<String>,
    /// Tasks that violate the `completed_at` invariant
    pub anomalies: usize,
}

#[derive(Default)]
struct StoreState {
    tasks: Arc<Vec<Task>>,
    rollups: Arc<BTreeMap<String, AgentRollup>>,
    statuses: HashMap<String, TaskStatus>,
    timelines: HashMap<String, StepTimeline>,
    expanded: HashSet<String>,
    /// Tasks whose logs were fetched and merged at least once
    logs_loaded: HashSet<String>,
    last_error: Option<String>,
    version: u64,
}

/// Read-mostly task state shared with the view layer.
///
/// Snapshots replace the collection wholesale and are immutable once
/// applied; derived views are recomputed from scratch per version. Step logs
/// are merged per task and never touch another task's timeline.
pub struct TaskStore {
    state: RwLock<StoreState>,
    version_tx: watch::Sender<u64>,
    known_agents: Vec<String>,
}

impl TaskStore {
    pub fn new(known_agents: Vec<String>) -> Self {
        let (version_tx, _) = watch::channel(0);
        Self {
            state: RwLock::new(StoreState::default()),
            version_tx,
            known_agents,
        }
    }

    /// Watch the store version; it changes on every snapshot or log merge
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }

    pub fn version(&self) -> u64 {
        self.state.read().version
    }

    /// Replace the collection with a fresh backend snapshot.
    ///
    /// A task entering `running` is expanded automatically, once per
    /// transition.
    pub fn apply_snapshot(&self, tasks: Vec<Task>) -> SnapshotDelta {
        let mut anomalies = 0;
        for task in &tasks {
            if let Err(problem) = task.check_invariants() {
                anomalies += 1;
                tracing::warn!(task_id = %task.id, "{}", problem);
            }
        }

        let rollups = compute_rollups(&tasks, &self.known_agents);
        let statuses: HashMap<String, TaskStatus> =
            tasks.iter().map(|t| (t.id.clone(), t.status)).collect();

        let delta = {
            let mut state = self.state.write();
            let entered_running: Vec<String> = tasks
                .iter()
                .filter(|t| {
                    t.status == TaskStatus::Running
                        && state.statuses.get(&t.id) != Some(&TaskStatus::Running)
                })
                .map(|t| t.id.clone())
                .collect();
            for id in &entered_running {
                tracing::debug!(task_id = %id, "task entered running, expanding");
                state.expanded.insert(id.clone());
            }

            state.timelines.retain(|id, _| statuses.contains_key(id));
            state.expanded.retain(|id| statuses.contains_key(id));
            state.logs_loaded.retain(|id| statuses.contains_key(id));

            state.tasks = Arc::new(tasks);
            state.rollups = Arc::new(rollups);
            state.statuses = statuses;
            state.last_error = None;
            state.version += 1;

            SnapshotDelta {
                version: state.version,
                entered_running,
                anomalies,
            }
        };
        self.version_tx.send_replace(delta.version);
        delta
    }

    /// Merge step logs for one task; returns how many entries changed the view
    pub fn merge_logs(&self, task_id: &str, entries: Vec<ActivityLogEntry>) -> usize {
        let (changed, version) = {
            let mut state = self.state.write();
            let entries = entries.into_iter().filter(|e| {
                let belongs = e.task_id == task_id;
                if !belongs {
                    tracing::warn!(task_id, entry_task = %e.task_id, "log entry for another task dropped");
                }
                belongs
            });
            let changed = state
                .timelines
                .entry(task_id.to_string())
                .or_default()
                .merge(entries);
            state.logs_loaded.insert(task_id.to_string());
            if changed > 0 {
                state.version += 1;
            }
            (changed, state.version)
        };
        if changed > 0 {
            self.version_tx.send_replace(version);
        }
        changed
    }

    /// Expand a task's detail view.
    ///
    /// Returns true until a log fetch for the task has been merged, so a
    /// failed fetch is retried on the next expand.
    pub fn expand(&self, task_id: &str) -> bool {
        let mut state = self.state.write();
        state.expanded.insert(task_id.to_string());
        !state.logs_loaded.contains(task_id)
    }

    pub fn collapse(&self, task_id: &str) {
        self.state.write().expanded.remove(task_id);
    }

    pub fn is_expanded(&self, task_id: &str) -> bool {
        self.state.read().expanded.contains(task_id)
    }

    /// Current snapshot, immutable for this version
    pub fn tasks(&self) -> Arc<Vec<Task>> {
        self.state.read().tasks.clone()
    }

    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.state.read().tasks.iter().find(|t| t.id == task_id).cloned()
    }

    pub fn filtered(&self, filter: StatusFilter) -> Vec<Task> {
        filter.apply(&self.tasks())
    }

    pub fn rollups(&self) -> Arc<BTreeMap<String, AgentRollup>> {
        self.state.read().rollups.clone()
    }

    /// Deduplicated step timeline for a task
    pub fn timeline(&self, task_id: &str) -> Vec<ActivityLogEntry> {
        self.state
            .read()
            .timelines
            .get(task_id)
            .map(|t| t.entries().to_vec())
            .unwrap_or_default()
    }

    /// Tasks owned by `parent_id`, oldest first
    pub fn children_of(&self, parent_id: &str) -> Vec<Task> {
        let mut children: Vec<Task> = self
            .tasks()
            .iter()
            .filter(|t| t.parent_task_id.as_deref() == Some(parent_id))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        children
    }

    /// Tasks with no parent in the snapshot
    pub fn top_level(&self, filter: StatusFilter) -> Vec<Task> {
        let tasks = self.tasks();
        let ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        let roots: Vec<Task> = tasks
            .iter()
            .filter(|t| {
                t.parent_task_id
                    .as_deref()
                    .is_none_or(|parent| !ids.contains(parent))
            })
            .cloned()
            .collect();
        filter.apply(&roots)
    }

    /// Ids of tasks a "stop all" should cancel
    pub fn active_ids(&self) -> Vec<String> {
        self.tasks()
            .iter()
            .filter(|t| t.status.is_active())
            .map(|t| t.id.clone())
            .collect()
    }

    pub fn totals(&self) -> TaskTotals {
        TaskTotals::from_tasks(self.tasks().iter())
    }

    /// Record a failed refresh; the last good snapshot stays in place
    pub fn record_error(&self, message: impl Into<String>) {
        self.state.write().last_error = Some(message.into());
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.read().last_error.clone()
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
