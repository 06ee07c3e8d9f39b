//! Retry loop around a single network call

use super::interceptor::{AttemptContext, AttemptOutcome, RequestInterceptor};
use super::notices::{NoticeGuard, RetryNotice, RetryNotices};
use super::{ErrorClass, ErrorClassifier, RetryPolicy, classify_error};
use crate::error::{TesseraError, TesseraResult};
use crate::events::{Event, EventBus};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{info, warn};

/// Per-call execution options
pub struct ExecuteOptions<'a, E> {
    /// Label used in logs and interceptor contexts
    pub operation: &'a str,
    pub policy: RetryPolicy,
    pub classifier: &'a dyn ErrorClassifier<E>,
    /// Token under which a retry notice is posted while waiting
    pub notice_token: Option<String>,
}

impl<'a, E> ExecuteOptions<'a, E> {
    pub fn new(
        operation: &'a str,
        policy: RetryPolicy,
        classifier: &'a dyn ErrorClassifier<E>,
    ) -> Self {
        Self {
            operation,
            policy,
            classifier,
            notice_token: None,
        }
    }

    pub fn with_notice_token(mut self, token: impl Into<String>) -> Self {
        self.notice_token = Some(token.into());
        self
    }
}

/// Runs an attempt function with retries and exponential backoff.
///
/// The executor knows nothing about what the attempt does. Invoking it again
/// must be safe; that is the caller's responsibility (GET-like reads, or a
/// request that fails before producing side effects).
///
/// Errors are never wrapped: the terminal or last error is returned as the
/// attempt produced it.
#[derive(Clone, Default)]
pub struct RequestExecutor {
    policy: RetryPolicy,
    interceptors: Vec<Arc<dyn RequestInterceptor>>,
    notices: RetryNotices,
    events: Option<EventBus>,
}

impl RequestExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    /// Append an interceptor; interceptors run in registration order
    pub fn with_interceptor(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_notices(mut self, notices: RetryNotices) -> Self {
        self.notices = notices;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn notices(&self) -> &RetryNotices {
        &self.notices
    }

    /// Execute an engine operation with the default policy and classifier
    pub async fn execute<T, F, Fut>(&self, operation: &str, attempt: F) -> TesseraResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = TesseraResult<T>>,
    {
        let classifier: &dyn ErrorClassifier<TesseraError> = &classify_error;
        let options = ExecuteOptions::new(operation, self.policy.clone(), classifier);
        self.execute_with(options, attempt).await
    }

    /// Execute `attempt` until it succeeds, fails terminally, or the budget
    /// in `options.policy` is spent.
    pub async fn execute_with<T, E, F, Fut>(
        &self,
        options: ExecuteOptions<'_, E>,
        mut attempt: F,
    ) -> Result<T, E>
    where
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = options.policy.max_attempts();
        let mut notice = NoticeGuard::new(
            &self.notices,
            self.events.as_ref(),
            options.notice_token.clone(),
        );
        let mut attempt_no = 1;

        loop {
            let ctx = AttemptContext {
                operation: options.operation,
                attempt: attempt_no,
                max_attempts,
            };
            for interceptor in &self.interceptors {
                interceptor.before_attempt(&ctx);
            }

            let error = match attempt().await {
                Ok(value) => {
                    self.notify_after(&ctx, &AttemptOutcome::Succeeded);
                    notice.settle();
                    if attempt_no > 1 {
                        info!(
                            operation = options.operation,
                            attempt = attempt_no,
                            "request succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let class = options.classifier.classify(&error);
            self.notify_after(
                &ctx,
                &AttemptOutcome::Failed {
                    error: &error,
                    class,
                },
            );

            if let ErrorClass::Terminal(kind) = class {
                warn!(
                    operation = options.operation,
                    attempt = attempt_no,
                    kind = ?kind,
                    error = %error,
                    "non-retryable error"
                );
                notice.settle();
                return Err(error);
            }

            if attempt_no >= max_attempts {
                tracing::error!(
                    operation = options.operation,
                    attempts = attempt_no,
                    error = %error,
                    "all retry attempts exhausted"
                );
                notice.settle();
                return Err(error);
            }

            let delay = options.policy.delay_for_attempt(attempt_no);
            warn!(
                operation = options.operation,
                attempt = attempt_no,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "retrying after failure"
            );
            notice.post(RetryNotice {
                next_attempt: attempt_no + 1,
                max_attempts,
                delay,
                reason: error.to_string(),
            });
            drop(error);
            if let Some(events) = &self.events {
                events.publish(Event::RetryScheduled {
                    token: notice.token().map(str::to_string),
                    operation: options.operation.to_string(),
                    next_attempt: attempt_no + 1,
                    max_attempts,
                    delay,
                });
            }

            sleep(delay).await;
            attempt_no += 1;
        }
    }

    fn notify_after(&self, ctx: &AttemptContext<'_>, outcome: &AttemptOutcome<'_>) {
        for interceptor in &self.interceptors {
            interceptor.after_attempt(ctx, outcome);
        }
    }
}
