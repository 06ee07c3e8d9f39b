use super::*;
use crate::error::TesseraError;
use crate::events::{EventBus, drain};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Interceptor that records what it sees
#[derive(Default)]
struct Recorder {
    log: Mutex<Vec<String>>,
}

impl RequestInterceptor for Recorder {
    fn before_attempt(&self, ctx: &AttemptContext<'_>) {
        self.log
            .lock()
            .push(format!("before {} #{}", ctx.operation, ctx.attempt));
    }

    fn after_attempt(&self, ctx: &AttemptContext<'_>, outcome: &AttemptOutcome<'_>) {
        let label = match outcome {
            AttemptOutcome::Succeeded => "ok".to_string(),
            AttemptOutcome::Failed { class, .. } => format!("err {:?}", class),
        };
        self.log.lock().push(format!("after #{} {}", ctx.attempt, label));
    }
}

type AttemptFuture = Pin<Box<dyn Future<Output = Result<&'static str, TesseraError>> + Send>>;

/// Fails with a 503 for the first `failures` calls, then succeeds
fn flaky(failures: u32, counter: Arc<AtomicU32>) -> impl FnMut() -> AttemptFuture {
    move || {
        let counter = counter.clone();
        Box::pin(async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= failures {
                Err(TesseraError::http(503, format!("unavailable #{}", n)))
            } else {
                Ok("payload")
            }
        })
    }
}

#[test]
fn test_classify_http_errors() {
    assert_eq!(
        classify_error(&TesseraError::http(401, "unauthorized")),
        ErrorClass::Terminal(TerminalKind::Auth)
    );
    for code in [400, 413, 429] {
        assert_eq!(
            classify_error(&TesseraError::http(code, "client")),
            ErrorClass::Terminal(TerminalKind::Client),
            "status {}",
            code
        );
    }
    for code in [408, 500, 502, 503, 504] {
        assert!(classify_error(&TesseraError::http(code, "server")).is_retryable());
    }
}

#[test]
fn test_classify_transport_errors() {
    assert!(classify_error(&TesseraError::network("connection reset")).is_retryable());
    assert!(classify_error(&TesseraError::timeout("cold start", Duration::from_secs(30))).is_retryable());
    assert!(!classify_error(&TesseraError::json("bad body")).is_retryable());
    assert!(!classify_error(&TesseraError::Cancelled).is_retryable());
}

#[test]
fn test_backoff_doubles_per_attempt() {
    let policy = RetryPolicy::new(4, Duration::from_millis(1000));

    assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
    assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
    assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
    assert_eq!(policy.total_backoff(), Duration::from_millis(7000));
}

#[test]
fn test_zero_budget_still_attempts_once() {
    let policy = RetryPolicy::new(0, Duration::from_secs(1));
    assert_eq!(policy.max_attempts(), 1);
    assert_eq!(policy.total_backoff(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_error_short_circuits() {
    let executor = RequestExecutor::new(RetryPolicy::new(3, Duration::from_millis(1000)));
    let calls = Arc::new(AtomicU32::new(0));
    let start = Instant::now();

    let counter = calls.clone();
    let result: Result<(), TesseraError> = executor
        .execute("chat.stream", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TesseraError::http(401, "session expired"))
            }
        })
        .await;

    let error = result.unwrap_err();
    assert_eq!(error.status_code(), Some(401));
    assert_eq!(error.to_string(), "HTTP error: session expired");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_two_transient_failures_then_success() {
    let executor = RequestExecutor::new(RetryPolicy::new(3, Duration::from_millis(1000)));
    let calls = Arc::new(AtomicU32::new(0));
    let start = Instant::now();

    let result = executor.execute("tasks.list", flaky(2, calls.clone())).await;

    assert_eq!(result.unwrap(), "payload");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(3000), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(3050), "elapsed {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_returns_last_error_unchanged() {
    let executor = RequestExecutor::new(RetryPolicy::new(3, Duration::from_millis(100)));
    let calls = Arc::new(AtomicU32::new(0));

    let result = executor.execute("tasks.list", flaky(10, calls.clone())).await;

    let error = result.unwrap_err();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(error.to_string(), "HTTP error: unavailable #3");
    assert_eq!(error.status_code(), Some(503));
}

#[tokio::test(start_paused = true)]
async fn test_notice_cleared_exactly_once_on_success() {
    let bus = EventBus::new(32);
    let mut rx = bus.subscribe();
    let notices = RetryNotices::new();
    let executor = RequestExecutor::new(RetryPolicy::new(3, Duration::from_millis(500)))
        .with_events(bus.clone())
        .with_notices(notices.clone());
    let calls = Arc::new(AtomicU32::new(0));

    let classifier: &dyn ErrorClassifier<TesseraError> = &classify_error;
    let options = ExecuteOptions::new("chat.stream", executor.policy().clone(), classifier)
        .with_notice_token("composer");
    let result = executor.execute_with(options, flaky(2, calls)).await;

    assert!(result.is_ok());
    assert!(notices.get("composer").is_none());
    let events = drain(&mut rx);
    let scheduled = events
        .iter()
        .filter(|e| e.event_type() == "retry_scheduled")
        .count();
    let settled: Vec<_> = events
        .iter()
        .filter(|e| e.event_type() == "retry_settled")
        .collect();
    assert_eq!(scheduled, 2);
    assert_eq!(settled.len(), 1);
    assert_eq!(
        settled[0],
        &crate::events::Event::RetrySettled {
            token: "composer".into()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_notice_visible_while_waiting_and_cleared_on_failure() {
    let notices = RetryNotices::new();
    let executor = Arc::new(
        RequestExecutor::new(RetryPolicy::new(2, Duration::from_millis(1000)))
            .with_notices(notices.clone()),
    );

    let runner = executor.clone();
    let handle = tokio::spawn(async move {
        let classifier: &dyn ErrorClassifier<TesseraError> = &classify_error;
        let options = ExecuteOptions::new("tasks.list", runner.policy().clone(), classifier)
            .with_notice_token("tasks");
        runner
            .execute_with(options, || async {
                Err::<(), _>(TesseraError::network("connection refused"))
            })
            .await
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    let notice = notices.get("tasks").expect("notice while backing off");
    assert_eq!(notice.next_attempt, 2);
    assert_eq!(notice.max_attempts, 2);
    assert!(notice.summary().starts_with("Retrying (2/2) in 1.0s"));

    let result = handle.await.unwrap();
    assert!(result.is_err());
    assert!(notices.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_notice_cleared_when_execution_dropped() {
    let notices = RetryNotices::new();
    let executor = RequestExecutor::new(RetryPolicy::new(3, Duration::from_secs(60)))
        .with_notices(notices.clone());

    let classifier: &dyn ErrorClassifier<TesseraError> = &classify_error;
    let options = ExecuteOptions::new("tasks.list", executor.policy().clone(), classifier)
        .with_notice_token("tasks");
    let run = executor.execute_with(options, || async {
        Err::<(), _>(TesseraError::network("down"))
    });

    let timed_out = tokio::time::timeout(Duration::from_secs(1), run).await;
    assert!(timed_out.is_err());
    assert!(notices.get("tasks").is_none());
}

#[tokio::test]
async fn test_interceptors_run_in_order_for_every_attempt() {
    let recorder = Arc::new(Recorder::default());
    let executor = RequestExecutor::new(RetryPolicy::new(3, Duration::ZERO))
        .with_interceptor(recorder.clone())
        .with_interceptor(Arc::new(TracingInterceptor));
    let calls = Arc::new(AtomicU32::new(0));

    executor
        .execute("tasks.logs", flaky(1, calls))
        .await
        .unwrap();

    let log = recorder.log.lock().clone();
    assert_eq!(
        log,
        vec![
            "before tasks.logs #1".to_string(),
            "after #1 err Retryable".to_string(),
            "before tasks.logs #2".to_string(),
            "after #2 ok".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_custom_classifier_over_foreign_error() {
    let executor = RequestExecutor::default();
    let calls = Arc::new(AtomicU32::new(0));
    let classify = |error: &String| {
        if error.contains("fatal") {
            ErrorClass::Terminal(TerminalKind::Client)
        } else {
            ErrorClass::Retryable
        }
    };

    let counter = calls.clone();
    let options: ExecuteOptions<'_, String> =
        ExecuteOptions::new("custom", RetryPolicy::new(5, Duration::ZERO), &classify);
    let result: Result<(), String> = executor
        .execute_with(options, move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err("blip".to_string())
                } else {
                    Err("fatal: bad request".to_string())
                }
            }
        })
        .await;

    assert_eq!(result.unwrap_err(), "fatal: bad request");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
