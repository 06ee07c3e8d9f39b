//! Per-agent summaries derived from the task collection

use super::model::{Task, TaskStatus};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// What an agent is doing, as far as its tasks tell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Working,
    Done,
    Failed,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Working => "working",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRollup {
    pub agent: String,
    pub status: AgentStatus,
    /// Label of the running task
    pub current_task: Option<String>,
    /// Label of the latest outcome
    pub last_result: Option<String>,
    /// Completed tasks
    pub task_count: usize,
}

/// Newest first; ties broken by id so the order is total
fn newest_first(a: &&Task, b: &&Task) -> Ordering {
    b.updated_at.cmp(&a.updated_at).then_with(|| b.id.cmp(&a.id))
}

/// Rollup for one agent over its own tasks
pub fn rollup_agent(agent: &str, tasks: &[&Task]) -> AgentRollup {
    let mut ordered = tasks.to_vec();
    ordered.sort_by(newest_first);

    let task_count = ordered
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count();
    let mut rollup = AgentRollup {
        agent: agent.to_string(),
        status: AgentStatus::Idle,
        current_task: None,
        last_result: None,
        task_count,
    };

    if let Some(running) = ordered.iter().find(|t| t.status == TaskStatus::Running) {
        rollup.status = AgentStatus::Working;
        rollup.current_task = Some(running.label().to_string());
        return rollup;
    }

    let outcome = ordered
        .iter()
        .find(|t| matches!(t.status, TaskStatus::Completed | TaskStatus::Failed));
    match outcome {
        Some(task) if task.status == TaskStatus::Completed => {
            rollup.status = AgentStatus::Done;
            rollup.last_result = Some(
                task.output_summary()
                    .unwrap_or_else(|| task.label().to_string()),
            );
        }
        Some(task) => {
            rollup.status = AgentStatus::Failed;
            rollup.last_result = Some(
                task.error
                    .clone()
                    .unwrap_or_else(|| task.label().to_string()),
            );
        }
        None => {}
    }
    rollup
}

/// Rollups for every known agent.
///
/// Known agents are `configured` plus every agent named by a task. Tasks
/// without an agent are not attributed to anyone.
pub fn compute_rollups(tasks: &[Task], configured: &[String]) -> BTreeMap<String, AgentRollup> {
    let mut by_agent: BTreeMap<&str, Vec<&Task>> = configured
        .iter()
        .map(|agent| (agent.as_str(), Vec::new()))
        .collect();
    for task in tasks {
        if let Some(agent) = task.agent.as_deref() {
            by_agent.entry(agent).or_default().push(task);
        }
    }

    by_agent
        .into_iter()
        .map(|(agent, tasks)| (agent.to_string(), rollup_agent(agent, &tasks)))
        .collect()
}
