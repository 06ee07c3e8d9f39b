//! Wiring of the engine components from configuration

use std::sync::Arc;
use std::time::Duration;
use tessera_core::auth::{SessionGuard, SessionState};
use tessera_core::chat::ChatSession;
use tessera_core::client::HttpBackend;
use tessera_core::config::TesseraConfig;
use tessera_core::events::EventBus;
use tessera_core::recovery::{RequestExecutor, TracingInterceptor};
use tessera_core::tasks::{TaskStore, TaskSync};

/// Everything a command needs, built once per invocation
pub struct Engine {
    pub config: TesseraConfig,
    pub events: EventBus,
    pub session: Arc<SessionState>,
    backend: Arc<HttpBackend>,
    executor: RequestExecutor,
}

impl Engine {
    pub fn new(config: TesseraConfig) -> anyhow::Result<Self> {
        let backend = Arc::new(HttpBackend::new(&config.api)?);
        let events = EventBus::new(256);
        let session = Arc::new(SessionState::new());
        let executor = RequestExecutor::new(config.retry.clone())
            .with_interceptor(Arc::new(TracingInterceptor))
            .with_interceptor(Arc::new(
                SessionGuard::new(session.clone()).with_events(events.clone()),
            ))
            .with_events(events.clone());

        tracing::debug!(base_url = backend.base_url(), "engine ready");
        Ok(Self {
            config,
            events,
            session,
            backend,
            executor,
        })
    }

    pub fn chat_session(&self) -> ChatSession {
        ChatSession::new(self.backend.clone(), self.executor.clone())
            .with_events(self.events.clone())
            .with_timeouts(self.config.api.connect_timeout, self.config.api.idle_timeout)
            .with_auto_speak(false)
    }

    pub fn task_sync(&self) -> TaskSync {
        self.task_sync_every(self.config.tasks.poll_interval)
    }

    pub fn task_sync_every(&self, poll_interval: Duration) -> TaskSync {
        let store = Arc::new(TaskStore::new(self.config.tasks.agents.clone()));
        TaskSync::new(self.backend.clone(), store, self.executor.clone(), poll_interval)
            .with_events(self.events.clone())
    }
}
