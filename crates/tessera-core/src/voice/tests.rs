use super::*;
use crate::events::{Event, EventBus, drain};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

const SETTLE: Duration = Duration::from_millis(300);

#[derive(Default)]
struct FakeCapture {
    unsupported: AtomicBool,
    fail_start: Mutex<Option<CaptureErrorKind>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl CaptureBackend for FakeCapture {
    fn is_supported(&self) -> bool {
        !self.unsupported.load(Ordering::SeqCst)
    }

    fn start(&self) -> Result<(), CaptureErrorKind> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        match self.fail_start.lock().take() {
            Some(kind) => Err(kind),
            None => Ok(()),
        }
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RecordingSink {
    submitted: Mutex<Vec<String>>,
}

#[async_trait]
impl VoiceSink for RecordingSink {
    async fn submit_voice(&self, transcript: String) {
        self.submitted.lock().push(transcript);
    }
}

/// Plays until `finish` is notified
#[derive(Default)]
struct FakePlayback {
    spoken: Mutex<Vec<String>>,
    stops: AtomicUsize,
    finish: Notify,
}

#[async_trait]
impl PlaybackBackend for FakePlayback {
    async fn speak(&self, text: &str) -> Result<(), String> {
        self.spoken.lock().push(text.to_string());
        self.finish.notified().await;
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    capture: Arc<FakeCapture>,
    sink: Arc<RecordingSink>,
    playback: Arc<FakePlayback>,
    speech: SpeechController,
    controller: VoiceController,
}

fn harness() -> Harness {
    let capture = Arc::new(FakeCapture::default());
    let sink = Arc::new(RecordingSink::default());
    let playback = Arc::new(FakePlayback::default());
    let speech = SpeechController::new(playback.clone(), AudioArbiter::new());
    let controller = VoiceController::new(capture.clone(), sink.clone(), speech.clone(), SETTLE);
    Harness {
        capture,
        sink,
        playback,
        speech,
        controller,
    }
}

async fn settle() {
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_transcript_submitted_once_after_settle_delay() {
    let h = harness();
    h.controller.toggle();
    assert_eq!(h.controller.state(), VoiceState::Listening { hypothesis: None });

    h.controller.on_event(CaptureEvent::Hypothesis("what is".into())).await;
    assert_eq!(h.controller.input_text(), "what is");
    h.controller
        .on_event(CaptureEvent::Hypothesis("what is on my list".into()))
        .await;
    assert!(h.sink.submitted.lock().is_empty());

    let start = Instant::now();
    h.controller.on_event(CaptureEvent::Ended).await;

    assert_eq!(start.elapsed(), SETTLE);
    assert_eq!(*h.sink.submitted.lock(), vec!["what is on my list".to_string()]);
    assert_eq!(h.controller.state(), VoiceState::Idle);
    assert_eq!(h.controller.input_text(), "");

    // A stray second end event must not resend.
    h.controller.on_event(CaptureEvent::Ended).await;
    assert_eq!(h.sink.submitted.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_end_without_hypothesis_sends_nothing() {
    let h = harness();
    h.controller.toggle();
    h.controller.on_event(CaptureEvent::Hypothesis("   ".into())).await;

    let start = Instant::now();
    h.controller.on_event(CaptureEvent::Ended).await;

    assert_eq!(start.elapsed(), Duration::ZERO);
    assert!(h.sink.submitted.lock().is_empty());
    assert_eq!(h.controller.state(), VoiceState::Idle);
}

#[tokio::test]
async fn test_toggle_while_listening_stops_without_submitting() {
    let h = harness();
    h.controller.toggle();
    h.controller.on_event(CaptureEvent::Hypothesis("half a".into())).await;

    h.controller.toggle();
    assert_eq!(h.controller.state(), VoiceState::Idle);
    assert_eq!(h.capture.stops.load(Ordering::SeqCst), 1);

    // The device reports its end after the user stopped it.
    h.controller.on_event(CaptureEvent::Ended).await;
    assert!(h.sink.submitted.lock().is_empty());
    assert_eq!(h.speech.arbiter().current(), None);
}

#[tokio::test]
async fn test_errors_clear_hypothesis_and_never_send() {
    for (kind, notice) in [
        (
            CaptureErrorKind::NotAllowed,
            Some("Microphone access was denied. Allow microphone access to use voice input."),
        ),
        (CaptureErrorKind::NoSpeech, Some("No speech was detected. Try again.")),
        (CaptureErrorKind::Aborted, None),
        (
            CaptureErrorKind::Other("network".into()),
            Some("Voice input failed. Please try again."),
        ),
    ] {
        let h = harness();
        h.controller.toggle();
        h.controller.on_event(CaptureEvent::Hypothesis("stale words".into())).await;

        h.controller.on_event(CaptureEvent::Error(kind.clone())).await;
        h.controller.on_event(CaptureEvent::Ended).await;

        assert_eq!(h.controller.state(), VoiceState::Idle, "{kind:?}");
        assert_eq!(h.controller.input_text(), "", "{kind:?}");
        assert_eq!(h.controller.notice().as_deref(), notice, "{kind:?}");
        assert!(h.sink.submitted.lock().is_empty(), "{kind:?}");
    }
}

#[tokio::test]
async fn test_unsupported_device_reports_notice() {
    let h = harness();
    h.capture.unsupported.store(true, Ordering::SeqCst);

    h.controller.toggle();

    assert_eq!(h.controller.state(), VoiceState::Idle);
    assert_eq!(h.capture.starts.load(Ordering::SeqCst), 0);
    assert_eq!(
        h.controller.notice().as_deref(),
        Some("Voice input is not supported on this device.")
    );
}

#[tokio::test]
async fn test_start_failure_returns_to_idle() {
    let h = harness();
    *h.capture.fail_start.lock() = Some(CaptureErrorKind::NotAllowed);

    h.controller.toggle();

    assert_eq!(h.controller.state(), VoiceState::Idle);
    assert!(h.controller.notice().is_some());
    assert_eq!(h.speech.arbiter().current(), None);

    // The next successful start clears the notice.
    h.controller.toggle();
    assert!(h.controller.notice().is_none());
    assert_eq!(h.speech.arbiter().current(), Some(AudioKind::Capture));
}

#[tokio::test(start_paused = true)]
async fn test_transcribing_blocks_edits_and_submits_final_text() {
    let h = harness();
    h.controller.toggle();
    h.controller.on_event(CaptureEvent::Hypothesis("draft".into())).await;
    h.controller.on_event(CaptureEvent::Processing).await;

    assert!(!h.controller.can_edit_input());
    assert!(!h.controller.set_input("typed"));
    assert_eq!(h.controller.state().hypothesis(), Some("draft"));

    h.controller.on_event(CaptureEvent::Hypothesis("final text".into())).await;
    h.controller.on_event(CaptureEvent::Ended).await;

    assert!(h.controller.can_edit_input());
    assert_eq!(*h.sink.submitted.lock(), vec!["final text".to_string()]);
}

#[tokio::test]
async fn test_state_changes_are_published() {
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();
    let capture = Arc::new(FakeCapture::default());
    let speech = SpeechController::new(Arc::new(FakePlayback::default()), AudioArbiter::new());
    let controller = VoiceController::new(
        capture,
        Arc::new(RecordingSink::default()),
        speech,
        SETTLE,
    )
    .with_events(bus);

    controller.toggle();
    controller.toggle();

    assert_eq!(
        drain(&mut rx),
        vec![
            Event::VoiceStateChanged {
                from: "idle",
                to: "listening"
            },
            Event::VoiceStateChanged {
                from: "listening",
                to: "idle"
            },
        ]
    );
}

#[tokio::test]
async fn test_reply_spoken_once_per_exchange() {
    let h = harness();
    let exchange = Uuid::new_v4();

    assert!(h.speech.speak_reply(exchange, "first reply"));
    assert!(h.speech.is_speaking());
    assert!(!h.speech.speak_reply(Uuid::new_v4(), "overlap"));

    h.playback.finish.notify_one();
    settle().await;
    assert!(!h.speech.is_speaking());
    assert_eq!(h.speech.arbiter().current(), None);

    assert!(!h.speech.speak_reply(exchange, "first reply"));
    assert_eq!(*h.playback.spoken.lock(), vec!["first reply".to_string()]);
}

#[tokio::test]
async fn test_stop_resets_speaking_immediately() {
    let h = harness();
    assert!(h.speech.speak_reply(Uuid::new_v4(), "long answer"));
    settle().await;

    h.speech.stop();

    assert!(!h.speech.is_speaking());
    assert_eq!(h.playback.stops.load(Ordering::SeqCst), 1);
    assert!(h.speech.speak_reply(Uuid::new_v4(), "next answer"));
}

#[tokio::test]
async fn test_capture_barges_in_on_playback() {
    let h = harness();
    assert!(h.speech.speak_reply(Uuid::new_v4(), "talking"));

    h.controller.toggle();

    assert!(!h.speech.is_speaking());
    assert_eq!(h.playback.stops.load(Ordering::SeqCst), 1);
    assert_eq!(h.speech.arbiter().current(), Some(AudioKind::Capture));
}

#[tokio::test]
async fn test_playback_preempts_capture() {
    let h = harness();
    h.controller.toggle();
    h.controller.on_event(CaptureEvent::Hypothesis("never sent".into())).await;

    assert!(h.speech.speak_reply(Uuid::new_v4(), "reply"));

    assert_eq!(h.capture.stops.load(Ordering::SeqCst), 1);
    assert_eq!(h.controller.state(), VoiceState::Idle);
    h.controller.on_event(CaptureEvent::Ended).await;
    assert!(h.sink.submitted.lock().is_empty());
}
