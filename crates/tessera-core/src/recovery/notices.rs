//! Token-keyed retry notices
//!
//! While a request is between attempts, a notice is posted under the
//! caller-supplied token so a view can show "retrying…". [`NoticeGuard`]
//! guarantees the notice is removed exactly once: on success, on final
//! failure, or when the executing future is dropped.

use crate::events::{Event, EventBus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A "retry in progress" notice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryNotice {
    /// Attempt that will run after the delay (1-based)
    pub next_attempt: u32,
    pub max_attempts: u32,
    pub delay: Duration,
    /// Display form of the failure that triggered the retry
    pub reason: String,
}

impl RetryNotice {
    /// Short text for a status line
    pub fn summary(&self) -> String {
        format!(
            "Retrying ({}/{}) in {:.1}s: {}",
            self.next_attempt,
            self.max_attempts,
            self.delay.as_secs_f64(),
            self.reason
        )
    }
}

/// Shared board of active retry notices
#[derive(Debug, Clone, Default)]
pub struct RetryNotices {
    inner: Arc<Mutex<HashMap<String, RetryNotice>>>,
}

impl RetryNotices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post or replace the notice for `token`
    pub fn post(&self, token: impl Into<String>, notice: RetryNotice) {
        self.inner.lock().insert(token.into(), notice);
    }

    /// Remove the notice for `token`, returning it if one was active
    pub fn clear(&self, token: &str) -> Option<RetryNotice> {
        self.inner.lock().remove(token)
    }

    /// Current notice for `token`
    pub fn get(&self, token: &str) -> Option<RetryNotice> {
        self.inner.lock().get(token).cloned()
    }

    /// Every active notice, sorted by token
    pub fn active(&self) -> Vec<(String, RetryNotice)> {
        let mut notices: Vec<_> = self
            .inner
            .lock()
            .iter()
            .map(|(token, notice)| (token.clone(), notice.clone()))
            .collect();
        notices.sort_by(|a, b| a.0.cmp(&b.0));
        notices
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Clears the notice for one execution exactly once
pub(super) struct NoticeGuard<'a> {
    notices: &'a RetryNotices,
    events: Option<&'a EventBus>,
    token: Option<String>,
    posted: bool,
}

impl<'a> NoticeGuard<'a> {
    pub(super) fn new(
        notices: &'a RetryNotices,
        events: Option<&'a EventBus>,
        token: Option<String>,
    ) -> Self {
        Self {
            notices,
            events,
            token,
            posted: false,
        }
    }

    pub(super) fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub(super) fn post(&mut self, notice: RetryNotice) {
        if let Some(token) = &self.token {
            self.notices.post(token.clone(), notice);
            self.posted = true;
        }
    }

    pub(super) fn settle(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        if !self.posted {
            return;
        }
        self.notices.clear(&token);
        tracing::debug!(token = %token, "retry notice cleared");
        if let Some(events) = self.events {
            events.publish(Event::RetrySettled { token });
        }
    }
}

impl Drop for NoticeGuard<'_> {
    fn drop(&mut self) {
        self.settle();
    }
}
