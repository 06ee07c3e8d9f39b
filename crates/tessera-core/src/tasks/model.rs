//! Task and activity log records as the backend delivers them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a background task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 6] = [
        Self::Pending,
        Self::Queued,
        Self::Running,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Completed, failed or cancelled
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Still worth cancelling
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown task status '{}'", s))
    }
}

/// Read-only snapshot of a backend task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
    /// Owning worker
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default, rename = "type")]
    pub task_type: Option<String>,
    #[serde(default)]
    pub intent: Option<String>,
    /// Dispatcher task that owns this one
    #[serde(default)]
    pub parent_task_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
    /// Present only when completed
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub cost_usd: Option<f64>,
    #[serde(default)]
    pub tokens_in: Option<u64>,
    #[serde(default)]
    pub tokens_out: Option<u64>,
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default)]
    pub cron_active: Option<bool>,
    #[serde(default)]
    pub next_run_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Human label: intent, then type, then id
    pub fn label(&self) -> &str {
        self.intent
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.task_type.as_deref())
            .unwrap_or(&self.id)
    }

    /// Short summary of the output, if the output carries one
    pub fn output_summary(&self) -> Option<String> {
        match self.output.as_ref()? {
            Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
            Value::Object(map) => ["summary", "result", "message"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string),
            _ => None,
        }
    }

    /// Standing job rather than one-shot
    pub fn is_recurring(&self) -> bool {
        self.cron_expression.is_some()
    }

    /// Check that `completed_at` is set exactly when the status is terminal
    pub fn check_invariants(&self) -> Result<(), String> {
        match (self.status.is_terminal(), self.completed_at.is_some()) {
            (true, false) => Err(format!(
                "task {} is {} but has no completed_at",
                self.id, self.status
            )),
            (false, true) => Err(format!(
                "task {} is {} but has completed_at set",
                self.id, self.status
            )),
            _ => Ok(()),
        }
    }
}

/// State of one execution step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Started,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record of a task's step log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: String,
    pub task_id: String,
    /// Stable key such as `fetch_sources`
    pub step: String,
    pub status: StepStatus,
    /// Only on terminal statuses
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub detail: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl ActivityLogEntry {
    pub fn error(&self) -> Option<&str> {
        self.detail.as_ref()?.get("error")?.as_str()
    }

    pub fn result_count(&self) -> Option<u64> {
        self.detail.as_ref()?.get("resultCount")?.as_u64()
    }
}

/// Aggregate telemetry over a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TaskTotals {
    pub tasks: usize,
    pub cost_usd: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

impl TaskTotals {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        tasks.into_iter().fold(Self::default(), |mut totals, task| {
            totals.tasks += 1;
            totals.cost_usd += task.cost_usd.unwrap_or(0.0);
            totals.tokens_in += task.tokens_in.unwrap_or(0);
            totals.tokens_out += task.tokens_out.unwrap_or(0);
            totals
        })
    }
}
