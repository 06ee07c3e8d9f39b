//! End-to-end flows through the engine against in-memory backends
//!
//! Covers voice capture handing off to the chat send path and playback, and
//! task polling feeding the reconciliation store.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use futures::stream;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::events::drain;
use tessera_core::stream::ByteStream;
use tessera_core::tasks::StepStatus;
use tessera_core::{
    ActivityLogEntry, AgentStatus, AudioArbiter, CaptureBackend, CaptureErrorKind, CaptureEvent,
    ChatBackend, ChatRequest, ChatSession, Event, EventBus, InputOrigin, MessageStatus,
    PlaybackBackend, RequestExecutor, RetryPolicy, SpeechController, StatusFilter, Task,
    TaskBackend, TaskStatus, TaskStore, TaskSync, TesseraResult, VoiceController, VoiceState,
};

const BODY: &str = concat!(
    ": keep-alive\n",
    "data: {\"sources\":[{\"id\":\"n1\",\"title\":\"Meeting notes\"}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"You have \"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"two meetings ☕\"}}]}\n\n",
    "data: {\"sources\":[{\"id\":\"n2\",\"title\":\"Ignored repeat\"}]}\n\n",
    "data: [DONE]\n\n",
);

/// Serves `BODY` split at the given byte offsets
struct SplitBackend {
    cuts: Mutex<Vec<Vec<usize>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl SplitBackend {
    fn new(cuts: Vec<Vec<usize>>) -> Arc<Self> {
        Arc::new(Self {
            cuts: Mutex::new(cuts),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChatBackend for SplitBackend {
    async fn open_stream(&self, request: &ChatRequest) -> TesseraResult<ByteStream> {
        self.requests.lock().push(request.clone());
        let cuts = self.cuts.lock().pop().unwrap_or_default();
        let bytes = BODY.as_bytes();
        let mut chunks = Vec::new();
        let mut start = 0;
        for cut in cuts.into_iter().chain(std::iter::once(bytes.len())) {
            chunks.push(Ok(Bytes::copy_from_slice(&bytes[start..cut])));
            start = cut;
        }
        Ok(Box::pin(stream::iter(chunks)))
    }
}

#[derive(Default)]
struct Microphone {
    open: Mutex<bool>,
}

impl CaptureBackend for Microphone {
    fn is_supported(&self) -> bool {
        true
    }

    fn start(&self) -> Result<(), CaptureErrorKind> {
        *self.open.lock() = true;
        Ok(())
    }

    fn stop(&self) {
        *self.open.lock() = false;
    }
}

#[derive(Default)]
struct Speaker {
    spoken: Mutex<Vec<String>>,
}

#[async_trait]
impl PlaybackBackend for Speaker {
    async fn speak(&self, text: &str) -> Result<(), String> {
        self.spoken.lock().push(text.to_string());
        std::future::pending::<()>().await;
        Ok(())
    }

    fn stop(&self) {}
}

#[tokio::test]
async fn test_reply_identical_for_every_two_way_split() {
    for cut in 1..BODY.len() {
        let backend = SplitBackend::new(vec![vec![cut]]);
        let chat = ChatSession::new(backend, RequestExecutor::default());

        let exchange = chat.send("what's today?", InputOrigin::Typed).await.unwrap();

        let reply = exchange.reply.read();
        assert_eq!(reply.content, "You have two meetings ☕", "split at {}", cut);
        assert_eq!(reply.status, MessageStatus::Complete);
        let sources = reply.sources.as_ref().unwrap();
        assert_eq!(sources.len(), 1, "split at {}", cut);
        assert_eq!(sources[0].label(), "Meeting notes");
    }
}

#[tokio::test(start_paused = true)]
async fn test_voice_question_is_sent_once_and_spoken_once() {
    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let backend = SplitBackend::new(vec![vec![3, 40, 41, 90, 150]]);
    let speaker = Arc::new(Speaker::default());
    let speech = SpeechController::new(speaker.clone(), AudioArbiter::new()).with_events(bus.clone());
    let chat = Arc::new(
        ChatSession::new(backend.clone(), RequestExecutor::default())
            .with_speech(speech.clone())
            .with_events(bus.clone()),
    );
    let microphone = Arc::new(Microphone::default());
    let voice = VoiceController::new(
        microphone.clone(),
        chat.clone(),
        speech.clone(),
        Duration::from_millis(300),
    )
    .with_events(bus.clone());

    voice.toggle();
    assert!(*microphone.open.lock());
    voice.on_event(CaptureEvent::Hypothesis("what's".into())).await;
    voice.on_event(CaptureEvent::Hypothesis("what's today?".into())).await;
    voice.on_event(CaptureEvent::Ended).await;
    tokio::task::yield_now().await;

    assert_eq!(voice.state(), VoiceState::Idle);
    let requests = backend.requests.lock().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].message, "what's today?");
    assert_eq!(chat.last_reply().unwrap().content, "You have two meetings ☕");
    assert_eq!(*speaker.spoken.lock(), vec!["You have two meetings ☕".to_string()]);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::ExchangeStarted {
            from_voice: true,
            ..
        }
    )));
    let started = events
        .iter()
        .filter(|e| matches!(e, Event::SpeechStarted { .. }))
        .count();
    assert_eq!(started, 1);

    // Starting a new capture silences the reply.
    voice.toggle();
    assert!(!speech.is_speaking());
}

struct TaskApi {
    snapshot: Mutex<Vec<Task>>,
    logs: HashMap<String, Vec<ActivityLogEntry>>,
    cancelled: Mutex<Vec<String>>,
}

#[async_trait]
impl TaskBackend for TaskApi {
    async fn list_tasks(&self) -> TesseraResult<Vec<Task>> {
        Ok(self.snapshot.lock().clone())
    }

    async fn task_logs(&self, task_id: &str) -> TesseraResult<Vec<ActivityLogEntry>> {
        Ok(self.logs.get(task_id).cloned().unwrap_or_default())
    }

    async fn cancel_task(&self, task_id: &str) -> TesseraResult<()> {
        self.cancelled.lock().push(task_id.to_string());
        Ok(())
    }
}

fn parse_tasks(value: serde_json::Value) -> Vec<Task> {
    serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn test_task_polling_builds_stable_views() {
    let tasks = parse_tasks(serde_json::json!([
        {
            "id": "dispatch", "status": "running", "agent": "dispatcher",
            "intent": "Morning digest",
            "created_at": "2026-03-01T08:00:00Z", "updated_at": "2026-03-01T08:05:00Z"
        },
        {
            "id": "fetch", "status": "completed", "agent": "scout",
            "parent_task_id": "dispatch", "intent": "Fetch inbox",
            "output": { "summary": "12 items" }, "cost_usd": 0.01,
            "created_at": "2026-03-01T08:01:00Z", "updated_at": "2026-03-01T08:02:00Z",
            "completed_at": "2026-03-01T08:02:00Z"
        },
        {
            "id": "write", "status": "queued", "agent": "writer",
            "parent_task_id": "dispatch", "intent": "Write digest",
            "created_at": "2026-03-01T08:02:00Z", "updated_at": "2026-03-01T08:02:00Z"
        }
    ]));
    let logs: Vec<ActivityLogEntry> = serde_json::from_value(serde_json::json!([
        { "id": "l2", "task_id": "dispatch", "step": "plan", "status": "completed",
          "duration_ms": 900, "created_at": "2026-03-01T08:00:01Z" },
        { "id": "l1", "task_id": "dispatch", "step": "plan", "status": "started",
          "created_at": "2026-03-01T08:00:00Z" },
        { "id": "l3", "task_id": "dispatch", "step": "delegate", "status": "started",
          "created_at": "2026-03-01T08:01:00Z" }
    ]))
    .unwrap();
    let api = Arc::new(TaskApi {
        snapshot: Mutex::new(tasks),
        logs: HashMap::from([("dispatch".to_string(), logs)]),
        cancelled: Mutex::new(Vec::new()),
    });
    let store = Arc::new(TaskStore::new(vec!["archivist".into()]));
    let sync = TaskSync::new(
        api.clone(),
        store.clone(),
        RequestExecutor::new(RetryPolicy::no_retry()),
        Duration::from_secs(5),
    );

    sync.refresh().await.unwrap();

    assert!(store.is_expanded("dispatch"));
    let timeline = store.timeline("dispatch");
    let steps: Vec<(&str, StepStatus)> =
        timeline.iter().map(|e| (e.step.as_str(), e.status)).collect();
    assert_eq!(
        steps,
        vec![("plan", StepStatus::Completed), ("delegate", StepStatus::Started)]
    );

    let rollups = store.rollups();
    assert_eq!(rollups["dispatcher"].status, AgentStatus::Working);
    assert_eq!(rollups["scout"].status, AgentStatus::Done);
    assert_eq!(rollups["scout"].last_result.as_deref(), Some("12 items"));
    assert_eq!(rollups["writer"].status, AgentStatus::Idle);
    assert_eq!(rollups["archivist"].status, AgentStatus::Idle);

    let children: Vec<String> = store.children_of("dispatch").into_iter().map(|t| t.id).collect();
    assert_eq!(children, vec!["fetch", "write"]);
    assert_eq!(store.filtered(StatusFilter::Only(TaskStatus::Queued)).len(), 1);

    let report = sync.stop_all().await;
    assert_eq!(report.requested, vec!["dispatch".to_string(), "write".to_string()]);
    assert_eq!(store.get("write").unwrap().status, TaskStatus::Queued);

    // The backend reports the real outcome on the next poll.
    {
        let mut snapshot = api.snapshot.lock();
        for task in snapshot.iter_mut().filter(|t| t.status.is_active()) {
            task.status = TaskStatus::Cancelled;
            task.completed_at = Some(Utc.with_ymd_and_hms(2026, 3, 1, 8, 6, 0).unwrap());
        }
    }
    sync.refresh().await.unwrap();
    assert_eq!(store.rollups()["dispatcher"].status, AgentStatus::Idle);
    assert_eq!(store.rollups()["scout"].status, AgentStatus::Done);
}
