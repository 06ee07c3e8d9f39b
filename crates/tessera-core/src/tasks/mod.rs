//! Task and activity reconciliation
//!
//! Task snapshots arrive wholesale from polling or push refreshes; step logs
//! arrive per task, lazily, in any order. [`TaskStore`] turns both into
//! stable views: a deduplicated step timeline per task, filtered task lists
//! and per-agent rollups. [`TaskSync`] is the only writer.

mod filter;
mod model;
mod rollup;
mod store;
mod sync;
mod timeline;

pub use filter::StatusFilter;
pub use model::{ActivityLogEntry, StepStatus, Task, TaskStatus, TaskTotals};
pub use rollup::{AgentRollup, AgentStatus, compute_rollups, rollup_agent};
pub use store::{SnapshotDelta, TaskStore};
pub use sync::{StopAllReport, TaskBackend, TaskSync};
pub use timeline::{StepTimeline, dedupe_steps};
