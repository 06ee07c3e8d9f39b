//! Core error type for the Tessera engine

use std::time::Duration;
use thiserror::Error;

/// Result type alias for Tessera operations
pub type TesseraResult<T> = Result<T, TesseraError>;

/// Main error type for the engine
///
/// `Clone` so the request executor can hold on to the last failure and hand it
/// back to the caller unchanged once retries are exhausted.
#[derive(Error, Debug, Clone)]
pub enum TesseraError {
    /// Backend answered with a non-success status
    #[error("HTTP error: {message}")]
    Http {
        message: String,
        url: Option<String>,
        status_code: Option<u16>,
    },

    /// Transport failed before a response was received
    #[error("Network error: {message}")]
    Network { message: String },

    /// No data arrived within the allowed window
    #[error("Timed out after {}ms: {message}", .elapsed.as_millis())]
    Timeout { message: String, elapsed: Duration },

    /// Response body failed after the stream was established
    #[error("Stream error: {message}")]
    Stream { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: Option<String>,
    },

    /// Invalid input errors
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Operation was cancelled
    #[error("Operation was cancelled")]
    Cancelled,

    /// Generic error
    #[error("Error: {message}")]
    Other { message: String },
}

impl TesseraError {
    /// HTTP status code carried by the error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status_code, .. } => *status_code,
            _ => None,
        }
    }

    /// Whether the backend rejected the session credentials
    pub fn is_unauthorized(&self) -> bool {
        self.status_code() == Some(401)
    }

    /// Stable code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Http { .. } => "TESSERA_HTTP",
            Self::Network { .. } => "TESSERA_NETWORK",
            Self::Timeout { .. } => "TESSERA_TIMEOUT",
            Self::Stream { .. } => "TESSERA_STREAM",
            Self::Json { .. } => "TESSERA_JSON",
            Self::Config { .. } => "TESSERA_CONFIG",
            Self::InvalidInput { .. } => "TESSERA_INVALID_INPUT",
            Self::Cancelled => "TESSERA_CANCELLED",
            Self::Other { .. } => "TESSERA_OTHER",
        }
    }
}

impl From<serde_json::Error> for TesseraError {
    fn from(error: serde_json::Error) -> Self {
        Self::json(error.to_string())
    }
}

impl From<reqwest::Error> for TesseraError {
    fn from(error: reqwest::Error) -> Self {
        let url = error.url().map(|u| u.to_string());
        if let Some(status) = error.status() {
            return Self::Http {
                message: error.to_string(),
                url,
                status_code: Some(status.as_u16()),
            };
        }
        if error.is_timeout() {
            return Self::Timeout {
                message: error.to_string(),
                elapsed: Duration::ZERO,
            };
        }
        if error.is_decode() {
            return Self::json(error.to_string());
        }
        Self::network(error.to_string())
    }
}
