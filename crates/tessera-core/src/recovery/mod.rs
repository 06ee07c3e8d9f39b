//! Resilient request execution
//!
//! This module wraps a single network call with:
//! - Error classification (retryable vs terminal)
//! - Exponential backoff between attempts
//! - Token-keyed "retrying…" notices that are always cleared
//! - An explicit interceptor list observing every attempt

mod backoff;
mod executor;
mod interceptor;
mod notices;

pub use backoff::RetryPolicy;
pub use executor::{ExecuteOptions, RequestExecutor};
pub use interceptor::{AttemptContext, AttemptOutcome, RequestInterceptor, TracingInterceptor};
pub use notices::{RetryNotice, RetryNotices};

use crate::error::TesseraError;

/// Why a terminal failure must not be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalKind {
    /// Expired or invalid session; the caller must sign out
    Auth,
    /// Request the backend will keep refusing (malformed, too large, rate-limited)
    Client,
}

/// Error classification for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// May succeed on another attempt
    Retryable,
    /// Surfaced immediately, without delay or consuming retry budget
    Terminal(TerminalKind),
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable)
    }
}

/// Partitions failures of an attempt into retryable and terminal
pub trait ErrorClassifier<E>: Send + Sync {
    fn classify(&self, error: &E) -> ErrorClass;
}

impl<E, F> ErrorClassifier<E> for F
where
    F: Fn(&E) -> ErrorClass + Send + Sync,
{
    fn classify(&self, error: &E) -> ErrorClass {
        self(error)
    }
}

/// Default classifier for engine errors
pub fn classify_error(error: &TesseraError) -> ErrorClass {
    match error {
        TesseraError::Http { status_code, .. } => match status_code {
            Some(401) => ErrorClass::Terminal(TerminalKind::Auth),
            Some(408) => ErrorClass::Retryable,
            Some(code) if *code >= 500 => ErrorClass::Retryable,
            Some(code) if *code >= 400 => ErrorClass::Terminal(TerminalKind::Client),
            // No status at all is an ambiguous transport failure
            _ => ErrorClass::Retryable,
        },
        TesseraError::Network { .. }
        | TesseraError::Timeout { .. }
        | TesseraError::Stream { .. }
        | TesseraError::Other { .. } => ErrorClass::Retryable,
        TesseraError::Json { .. }
        | TesseraError::Config { .. }
        | TesseraError::InvalidInput { .. }
        | TesseraError::Cancelled => ErrorClass::Terminal(TerminalKind::Client),
    }
}

#[cfg(test)]
mod tests;
