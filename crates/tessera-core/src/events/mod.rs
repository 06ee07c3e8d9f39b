//! Event bus for engine notifications
//!
//! Components publish what happened; view layers subscribe. Every piece of
//! state announced here is also readable through the owning component's
//! synchronous accessors, so a subscriber that lags and drops events can
//! always catch up by reading.

use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Engine-wide events published through the [`EventBus`]
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    // ========== Request Events ==========
    /// A failed attempt will be retried after `delay`
    RetryScheduled {
        token: Option<String>,
        operation: String,
        next_attempt: u32,
        max_attempts: u32,
        delay: Duration,
    },

    /// The retry notice registered under `token` was cleared
    RetrySettled { token: String },

    /// The backend rejected the session; the user has been signed out
    SessionExpired { reason: String },

    // ========== Chat Events ==========
    /// A chat exchange was submitted
    ExchangeStarted { exchange_id: Uuid, from_voice: bool },

    /// Reference material was attached to the reply
    SourcesAttached { exchange_id: Uuid, count: usize },

    /// The reply streamed to completion
    ExchangeCompleted { exchange_id: Uuid, length: usize },

    /// The reply stopped part-way; partial content is kept
    ExchangeInterrupted { exchange_id: Uuid, notice: String },

    /// The request failed before any content arrived
    ExchangeFailed { exchange_id: Uuid, notice: String },

    // ========== Voice Events ==========
    /// Voice capture state changed
    VoiceStateChanged { from: &'static str, to: &'static str },

    /// Voice capture produced a user-visible notice
    VoiceNotice { message: String },

    /// Reply playback started
    SpeechStarted { exchange_id: Uuid },

    /// Reply playback stopped or finished
    SpeechStopped { exchange_id: Option<Uuid> },

    // ========== Task Events ==========
    /// A new task snapshot was applied
    TasksRefreshed { version: u64, count: usize },

    /// Step logs for a task were merged
    TaskLogsLoaded { task_id: String, entries: usize },

    /// A cancellation request was sent for a task
    TaskCancelRequested { task_id: String },
}

impl Event {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RetryScheduled { .. } => "retry_scheduled",
            Self::RetrySettled { .. } => "retry_settled",
            Self::SessionExpired { .. } => "session_expired",
            Self::ExchangeStarted { .. } => "exchange_started",
            Self::SourcesAttached { .. } => "sources_attached",
            Self::ExchangeCompleted { .. } => "exchange_completed",
            Self::ExchangeInterrupted { .. } => "exchange_interrupted",
            Self::ExchangeFailed { .. } => "exchange_failed",
            Self::VoiceStateChanged { .. } => "voice_state_changed",
            Self::VoiceNotice { .. } => "voice_notice",
            Self::SpeechStarted { .. } => "speech_started",
            Self::SpeechStopped { .. } => "speech_stopped",
            Self::TasksRefreshed { .. } => "tasks_refreshed",
            Self::TaskLogsLoaded { .. } => "task_logs_loaded",
            Self::TaskCancelRequested { .. } => "task_cancel_requested",
        }
    }
}

/// Event bus for engine-wide event distribution
///
/// Uses a broadcast channel; each subscriber receives a copy of every event
/// published after it subscribed.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    capacity: usize,
}

impl EventBus {
    /// Create a new event bus with the specified capacity
    ///
    /// The capacity determines how many events can be buffered before
    /// slow subscribers start losing events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Publish an event to all subscribers
    ///
    /// Returns the number of active receivers, 0 when nobody is listening.
    pub fn publish(&self, event: Event) -> usize {
        tracing::trace!(event = event.event_type(), "publishing event");
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Drain every event currently buffered in `receiver`
pub fn drain(receiver: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "event subscriber lagged");
            }
            Err(_) => break,
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(8);
        assert_eq!(bus.publish(Event::RetrySettled { token: "t".into() }), 0);
    }

    #[test]
    fn test_subscribers_receive_events_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(Event::TaskCancelRequested {
            task_id: "a".into(),
        });
        bus.publish(Event::TasksRefreshed {
            version: 2,
            count: 0,
        });

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type(), "task_cancel_requested");
        assert_eq!(events[1].event_type(), "tasks_refreshed");
    }

    #[test]
    fn test_clones_share_channel() {
        let bus = EventBus::default();
        let clone = bus.clone();
        let mut rx = bus.subscribe();

        clone.publish(Event::SessionExpired {
            reason: "401".into(),
        });

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(drain(&mut rx).len(), 1);
    }
}
