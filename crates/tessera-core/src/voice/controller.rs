//! Voice capture state machine

use super::arbiter::{AudioKind, AudioLease};
use super::speech::SpeechController;
use super::{CaptureBackend, CaptureErrorKind, CaptureEvent, VoiceSink, VoiceState};
use crate::events::{Event, EventBus};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

const UNSUPPORTED_NOTICE: &str = "Voice input is not supported on this device.";

#[derive(Default)]
struct ControllerInner {
    state: VoiceState,
    input: String,
    notice: Option<String>,
    lease: Option<AudioLease>,
}

/// Owns the microphone lifecycle and hands transcripts to the send path
pub struct VoiceController {
    capture: Arc<dyn CaptureBackend>,
    sink: Arc<dyn VoiceSink>,
    speech: SpeechController,
    settle_delay: Duration,
    inner: Mutex<ControllerInner>,
    events: Option<EventBus>,
}

impl VoiceController {
    pub fn new(
        capture: Arc<dyn CaptureBackend>,
        sink: Arc<dyn VoiceSink>,
        speech: SpeechController,
        settle_delay: Duration,
    ) -> Self {
        Self {
            capture,
            sink,
            speech,
            settle_delay,
            inner: Mutex::new(ControllerInner::default()),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> VoiceState {
        let mut inner = self.inner.lock();
        self.release_if_preempted(&mut inner);
        inner.state.clone()
    }

    /// Text of the input field, mirroring the current hypothesis while listening
    pub fn input_text(&self) -> String {
        self.inner.lock().input.clone()
    }

    /// Last capture notice for the user
    pub fn notice(&self) -> Option<String> {
        self.inner.lock().notice.clone()
    }

    pub fn can_edit_input(&self) -> bool {
        !matches!(self.inner.lock().state, VoiceState::Transcribing { .. })
    }

    /// Replace the input text from typing; refused while transcribing
    pub fn set_input(&self, text: impl Into<String>) -> bool {
        let mut inner = self.inner.lock();
        if matches!(inner.state, VoiceState::Transcribing { .. }) {
            return false;
        }
        inner.input = text.into();
        true
    }

    /// Start capture from idle, or stop it without submitting
    pub fn toggle(&self) {
        let mut inner = self.inner.lock();
        self.release_if_preempted(&mut inner);

        if !inner.state.is_idle() {
            tracing::debug!(state = inner.state.name(), "capture stopped by user");
            self.capture.stop();
            if let Some(lease) = inner.lease.take() {
                self.speech.arbiter().release(&lease);
            }
            self.transition(&mut inner, VoiceState::Idle);
            return;
        }

        if !self.capture.is_supported() {
            self.set_notice(&mut inner, UNSUPPORTED_NOTICE.to_string());
            return;
        }

        // Barge-in: a new capture always silences the reply being spoken.
        self.speech.stop();
        let capture = self.capture.clone();
        let lease = self
            .speech
            .arbiter()
            .acquire(AudioKind::Capture, move || capture.stop());

        if let Err(kind) = self.capture.start() {
            self.speech.arbiter().release(&lease);
            self.handle_error(&mut inner, kind);
            return;
        }

        inner.lease = Some(lease);
        inner.notice = None;
        self.transition(&mut inner, VoiceState::Listening { hypothesis: None });
    }

    /// Apply a capture device event.
    ///
    /// When capture ends with a transcript, this waits out the settle delay
    /// and then submits the transcript to the sink.
    pub async fn on_event(&self, event: CaptureEvent) {
        let transcript = {
            let mut inner = self.inner.lock();
            self.release_if_preempted(&mut inner);
            if inner.state.is_idle() {
                tracing::debug!(?event, "capture event ignored while idle");
                return;
            }

            match event {
                CaptureEvent::Hypothesis(text) => {
                    inner.input = text.clone();
                    if let Some(current) = inner.state.hypothesis_mut() {
                        *current = (!text.trim().is_empty()).then_some(text);
                    }
                    None
                }
                CaptureEvent::Processing => {
                    let hypothesis = inner.state.hypothesis_mut().and_then(|h| h.take());
                    self.transition(&mut inner, VoiceState::Transcribing { hypothesis });
                    None
                }
                CaptureEvent::Ended => {
                    let hypothesis = inner.state.hypothesis_mut().and_then(|h| h.take());
                    if let Some(lease) = inner.lease.take() {
                        self.speech.arbiter().release(&lease);
                    }
                    self.transition(&mut inner, VoiceState::Idle);
                    if hypothesis.is_none() {
                        tracing::debug!("capture ended without a transcript");
                    }
                    hypothesis
                }
                CaptureEvent::Error(kind) => {
                    self.capture.stop();
                    self.handle_error(&mut inner, kind);
                    None
                }
            }
        };

        let Some(transcript) = transcript else {
            return;
        };
        tracing::info!(chars = transcript.chars().count(), "submitting voice transcript");
        tokio::time::sleep(self.settle_delay).await;
        self.sink.submit_voice(transcript.clone()).await;

        let mut inner = self.inner.lock();
        if inner.state.is_idle() && inner.input == transcript {
            inner.input.clear();
        }
    }

    fn handle_error(&self, inner: &mut ControllerInner, kind: CaptureErrorKind) {
        if let Some(lease) = inner.lease.take() {
            self.speech.arbiter().release(&lease);
        }
        // Never leave a transcript behind that could be sent later.
        inner.input.clear();
        self.transition(inner, VoiceState::Idle);

        match kind.notice() {
            Some(notice) => {
                tracing::warn!(?kind, "voice capture failed");
                self.set_notice(inner, notice.to_string());
            }
            None => tracing::debug!("voice capture aborted"),
        }
    }

    /// Drop to idle if playback took the device away
    fn release_if_preempted(&self, inner: &mut ControllerInner) {
        if inner.lease.as_ref().is_some_and(AudioLease::is_preempted) {
            tracing::debug!("capture preempted by playback");
            inner.lease = None;
            inner.input.clear();
            self.transition(inner, VoiceState::Idle);
        }
    }

    fn transition(&self, inner: &mut ControllerInner, next: VoiceState) {
        let from = inner.state.name();
        inner.state = next;
        let to = inner.state.name();
        if from != to {
            tracing::debug!(from, to, "voice state changed");
            self.publish(Event::VoiceStateChanged { from, to });
        }
    }

    fn set_notice(&self, inner: &mut ControllerInner, message: String) {
        inner.notice = Some(message.clone());
        self.publish(Event::VoiceNotice { message });
    }

    fn publish(&self, event: Event) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}
