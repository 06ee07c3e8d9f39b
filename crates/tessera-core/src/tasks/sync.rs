//! Single writer that keeps the task store in step with the backend

use super::model::{ActivityLogEntry, Task};
use super::store::TaskStore;
use crate::error::{TesseraError, TesseraResult, UserFriendlyError};
use crate::events::{Event, EventBus};
use crate::recovery::{ErrorClassifier, ExecuteOptions, RequestExecutor, RetryPolicy, classify_error};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Task endpoints of the backend
#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// Full current snapshot
    async fn list_tasks(&self) -> TesseraResult<Vec<Task>>;

    /// Every log entry of one task
    async fn task_logs(&self, task_id: &str) -> TesseraResult<Vec<ActivityLogEntry>>;

    /// Ask the backend to cancel a task
    async fn cancel_task(&self, task_id: &str) -> TesseraResult<()>;
}

/// Outcome of a "stop all" request
#[derive(Debug, Default)]
pub struct StopAllReport {
    pub requested: Vec<String>,
    pub failed: Vec<(String, TesseraError)>,
}

/// Polls the backend and feeds the [`TaskStore`]
pub struct TaskSync {
    backend: Arc<dyn TaskBackend>,
    store: Arc<TaskStore>,
    executor: RequestExecutor,
    events: Option<EventBus>,
    poll_interval: Duration,
    push: Arc<Notify>,
}

impl TaskSync {
    pub fn new(
        backend: Arc<dyn TaskBackend>,
        store: Arc<TaskStore>,
        executor: RequestExecutor,
        poll_interval: Duration,
    ) -> Self {
        Self {
            backend,
            store,
            executor,
            events: None,
            poll_interval,
            push: Arc::new(Notify::new()),
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// Handle for push notifications; notifying it triggers a refresh in `run`
    pub fn push_handle(&self) -> Arc<Notify> {
        self.push.clone()
    }

    /// Fetch a fresh snapshot and apply it.
    ///
    /// On failure the previous snapshot stays and the failure is recorded
    /// for the view.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> TesseraResult<u64> {
        let backend = self.backend.clone();
        let result = self
            .executor
            .execute("tasks.list", || {
                let backend = backend.clone();
                async move { backend.list_tasks().await }
            })
            .await;

        let tasks = match result {
            Ok(tasks) => tasks,
            Err(error) => {
                let notice = UserFriendlyError::from(&error).title;
                tracing::warn!(error = %error, "task refresh failed, keeping last snapshot");
                self.store.record_error(notice);
                return Err(error);
            }
        };

        let count = tasks.len();
        let delta = self.store.apply_snapshot(tasks);
        tracing::debug!(version = delta.version, count, "task snapshot applied");
        self.publish(Event::TasksRefreshed {
            version: delta.version,
            count,
        });

        let fetches = delta.entered_running.iter().map(|id| self.load_logs(id));
        for (id, result) in delta.entered_running.iter().zip(join_all(fetches).await) {
            if let Err(error) = result {
                tracing::warn!(task_id = %id, error = %error, "log fetch for running task failed");
            }
        }
        Ok(delta.version)
    }

    /// Fetch and merge the step log of one task
    #[instrument(skip(self))]
    pub async fn load_logs(&self, task_id: &str) -> TesseraResult<usize> {
        let backend = self.backend.clone();
        let entries = self
            .executor
            .execute("tasks.logs", || {
                let backend = backend.clone();
                let task_id = task_id.to_string();
                async move { backend.task_logs(&task_id).await }
            })
            .await?;

        let received = entries.len();
        let changed = self.store.merge_logs(task_id, entries);
        tracing::debug!(task_id, received, changed, "task logs merged");
        self.publish(Event::TaskLogsLoaded {
            task_id: task_id.to_string(),
            entries: received,
        });
        Ok(changed)
    }

    /// Expand a task, fetching its logs the first time
    pub async fn expand(&self, task_id: &str) -> TesseraResult<()> {
        if self.store.expand(task_id) {
            self.load_logs(task_id).await?;
        }
        Ok(())
    }

    /// Ask the backend to cancel one task.
    ///
    /// Single attempt. The local status is left alone; the next snapshot
    /// reports what really happened.
    #[instrument(skip(self))]
    pub async fn cancel(&self, task_id: &str) -> TesseraResult<()> {
        let classifier: &dyn ErrorClassifier<TesseraError> = &classify_error;
        let options = ExecuteOptions::new("tasks.cancel", RetryPolicy::no_retry(), classifier);
        let backend = self.backend.clone();
        self.executor
            .execute_with(options, || {
                let backend = backend.clone();
                let task_id = task_id.to_string();
                async move { backend.cancel_task(&task_id).await }
            })
            .await?;

        tracing::info!(task_id, "cancellation requested");
        self.publish(Event::TaskCancelRequested {
            task_id: task_id.to_string(),
        });
        Ok(())
    }

    /// Cancel every pending, queued or running task in the current snapshot
    pub async fn stop_all(&self) -> StopAllReport {
        let ids = self.store.active_ids();
        let results = join_all(ids.iter().map(|id| self.cancel(id))).await;

        let mut report = StopAllReport::default();
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(()) => report.requested.push(id),
                Err(error) => report.failed.push((id, error)),
            }
        }
        if !report.failed.is_empty() {
            tracing::warn!(failed = report.failed.len(), "some cancellations were not delivered");
        }
        report
    }

    /// Refresh on every poll interval or push notification until cancelled
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(poll_interval_ms = self.poll_interval.as_millis() as u64, "task sync started");
        loop {
            // Failures are recorded in the store and logged by `refresh`.
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.refresh() => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = self.push.notified() => {
                    tracing::debug!("push notification received");
                }
            }
        }
        tracing::info!("task sync stopped");
    }

    fn publish(&self, event: Event) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}
