//! Session teardown on authentication failure
//!
//! Authentication itself lives outside the engine. The engine only needs to
//! end the session when the backend rejects it, which [`SessionGuard`] does
//! as a request interceptor.

use crate::events::{Event, EventBus};
use crate::recovery::{AttemptContext, AttemptOutcome, ErrorClass, RequestInterceptor, TerminalKind};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The signed-in session as far as the engine is concerned
pub trait AuthSession: Send + Sync {
    /// Whether requests may still be made
    fn is_signed_in(&self) -> bool;

    /// Tear the session down; the user must re-authenticate
    fn sign_out(&self, reason: &str);
}

/// In-memory session flag
#[derive(Debug)]
pub struct SessionState {
    signed_in: AtomicBool,
    sign_out_reason: Mutex<Option<String>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            signed_in: AtomicBool::new(true),
            sign_out_reason: Mutex::new(None),
        }
    }

    /// Why the session ended, if it has
    pub fn sign_out_reason(&self) -> Option<String> {
        self.sign_out_reason.lock().clone()
    }

    /// Mark the session as signed in again
    pub fn restore(&self) {
        *self.sign_out_reason.lock() = None;
        self.signed_in.store(true, Ordering::SeqCst);
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthSession for SessionState {
    fn is_signed_in(&self) -> bool {
        self.signed_in.load(Ordering::SeqCst)
    }

    fn sign_out(&self, reason: &str) {
        if self.signed_in.swap(false, Ordering::SeqCst) {
            *self.sign_out_reason.lock() = Some(reason.to_string());
        }
    }
}

/// Signs the user out when an attempt fails with an auth-terminal error
pub struct SessionGuard {
    session: Arc<dyn AuthSession>,
    events: Option<EventBus>,
}

impl SessionGuard {
    pub fn new(session: Arc<dyn AuthSession>) -> Self {
        Self {
            session,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }
}

impl RequestInterceptor for SessionGuard {
    fn after_attempt(&self, ctx: &AttemptContext<'_>, outcome: &AttemptOutcome<'_>) {
        let AttemptOutcome::Failed {
            error,
            class: ErrorClass::Terminal(TerminalKind::Auth),
        } = outcome
        else {
            return;
        };
        if !self.session.is_signed_in() {
            return;
        }

        let reason = error.to_string();
        tracing::warn!(operation = ctx.operation, reason = %reason, "session rejected, signing out");
        self.session.sign_out(&reason);
        if let Some(events) = &self.events {
            events.publish(Event::SessionExpired { reason });
        }
    }
}
