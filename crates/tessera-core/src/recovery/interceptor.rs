//! Attempt interceptors
//!
//! Interceptors observe each attempt the executor makes. They are registered
//! explicitly on a [`super::RequestExecutor`] and invoked in registration
//! order, instead of patching the transport globally.

use super::ErrorClass;
use std::fmt;

/// Identifies one attempt of one execution
#[derive(Debug, Clone, Copy)]
pub struct AttemptContext<'a> {
    /// Operation label, e.g. `chat.stream` or `tasks.list`
    pub operation: &'a str,
    /// 1-based attempt number
    pub attempt: u32,
    pub max_attempts: u32,
}

/// Result of one attempt as seen by interceptors
#[derive(Clone, Copy)]
pub enum AttemptOutcome<'a> {
    Succeeded,
    Failed {
        error: &'a dyn fmt::Display,
        class: ErrorClass,
    },
}

impl fmt::Debug for AttemptOutcome<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("Succeeded"),
            Self::Failed { error, class } => f
                .debug_struct("Failed")
                .field("error", &error.to_string())
                .field("class", class)
                .finish(),
        }
    }
}

/// Hook invoked around every attempt
pub trait RequestInterceptor: Send + Sync {
    fn before_attempt(&self, _ctx: &AttemptContext<'_>) {}

    fn after_attempt(&self, _ctx: &AttemptContext<'_>, _outcome: &AttemptOutcome<'_>) {}
}

/// Logs every attempt through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingInterceptor;

impl RequestInterceptor for TracingInterceptor {
    fn before_attempt(&self, ctx: &AttemptContext<'_>) {
        tracing::debug!(
            operation = ctx.operation,
            attempt = ctx.attempt,
            max_attempts = ctx.max_attempts,
            "request attempt started"
        );
    }

    fn after_attempt(&self, ctx: &AttemptContext<'_>, outcome: &AttemptOutcome<'_>) {
        match outcome {
            AttemptOutcome::Succeeded => tracing::debug!(
                operation = ctx.operation,
                attempt = ctx.attempt,
                "request attempt succeeded"
            ),
            AttemptOutcome::Failed { error, class } => tracing::warn!(
                operation = ctx.operation,
                attempt = ctx.attempt,
                retryable = class.is_retryable(),
                error = %error,
                "request attempt failed"
            ),
        }
    }
}
