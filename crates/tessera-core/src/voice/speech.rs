//! Reply playback with barge-in

use super::PlaybackBackend;
use super::arbiter::{AudioArbiter, AudioKind, AudioLease};
use crate::events::{Event, EventBus};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

struct ActivePlayback {
    exchange_id: Uuid,
    lease: AudioLease,
}

#[derive(Default)]
struct SpeechInner {
    active: Option<ActivePlayback>,
    spoken: HashSet<Uuid>,
}

/// Speaks replies, at most once per exchange and never over other audio
#[derive(Clone)]
pub struct SpeechController {
    playback: Arc<dyn PlaybackBackend>,
    arbiter: AudioArbiter,
    inner: Arc<Mutex<SpeechInner>>,
    events: Option<EventBus>,
}

impl SpeechController {
    pub fn new(playback: Arc<dyn PlaybackBackend>, arbiter: AudioArbiter) -> Self {
        Self {
            playback,
            arbiter,
            inner: Arc::new(Mutex::new(SpeechInner::default())),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn arbiter(&self) -> &AudioArbiter {
        &self.arbiter
    }

    pub fn is_speaking(&self) -> bool {
        self.inner.lock().active.is_some()
    }

    /// Start speaking the reply to `exchange_id` in the background.
    ///
    /// Returns false when this exchange was already spoken or something is
    /// currently speaking.
    pub fn speak_reply(&self, exchange_id: Uuid, text: impl Into<String>) -> bool {
        let text = text.into();
        if text.trim().is_empty() {
            return false;
        }
        {
            let mut inner = self.inner.lock();
            if inner.active.is_some() || !inner.spoken.insert(exchange_id) {
                return false;
            }
        }

        let lease = {
            let playback = self.playback.clone();
            let inner = self.inner.clone();
            let events = self.events.clone();
            self.arbiter.acquire(AudioKind::Playback, move || {
                playback.stop();
                if let Some(active) = inner.lock().active.take() {
                    publish(events.as_ref(), Event::SpeechStopped {
                        exchange_id: Some(active.exchange_id),
                    });
                }
            })
        };
        self.inner.lock().active = Some(ActivePlayback {
            exchange_id,
            lease: lease.clone(),
        });
        tracing::debug!(%exchange_id, "speaking reply");
        self.publish(Event::SpeechStarted { exchange_id });

        let this = self.clone();
        tokio::spawn(async move {
            let token = lease.token().clone();
            tokio::select! {
                _ = token.cancelled() => {}
                result = this.playback.speak(&text) => {
                    if let Err(error) = result {
                        tracing::warn!(%exchange_id, error = %error, "playback failed");
                    }
                    this.finish(&lease);
                }
            }
        });
        true
    }

    /// Tear down in-flight playback and reset the speaking flag
    pub fn stop(&self) {
        let active = self.inner.lock().active.take();
        let Some(active) = active else {
            return;
        };
        active.lease.token().cancel();
        self.playback.stop();
        self.arbiter.release(&active.lease);
        tracing::debug!(exchange_id = %active.exchange_id, "playback stopped");
        self.publish(Event::SpeechStopped {
            exchange_id: Some(active.exchange_id),
        });
    }

    fn finish(&self, lease: &AudioLease) {
        let finished = {
            let mut inner = self.inner.lock();
            if inner.active.as_ref().is_some_and(|a| a.lease.same_as(lease)) {
                inner.active.take()
            } else {
                None
            }
        };
        if let Some(active) = finished {
            self.arbiter.release(lease);
            self.publish(Event::SpeechStopped {
                exchange_id: Some(active.exchange_id),
            });
        }
    }

    fn publish(&self, event: Event) {
        publish(self.events.as_ref(), event);
    }
}

fn publish(events: Option<&EventBus>, event: Event) {
    if let Some(events) = events {
        events.publish(event);
    }
}
