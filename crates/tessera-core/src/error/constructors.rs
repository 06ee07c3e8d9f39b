//! Constructor methods for TesseraError

use super::types::TesseraError;
use std::time::Duration;

impl TesseraError {
    /// Create an HTTP status error
    pub fn http(status_code: u16, message: impl Into<String>) -> Self {
        Self::Http {
            message: message.into(),
            url: None,
            status_code: Some(status_code),
        }
    }

    /// Create an HTTP status error for a specific URL
    pub fn http_with_url(
        status_code: u16,
        message: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self::Http {
            message: message.into(),
            url: Some(url.into()),
            status_code: Some(status_code),
        }
    }

    /// Create a transport error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            message: message.into(),
            elapsed,
        }
    }

    /// Create a mid-stream error
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream {
            message: message.into(),
        }
    }

    /// Create a JSON error
    pub fn json(message: impl Into<String>) -> Self {
        Self::Json {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: None,
        }
    }

    /// Create a configuration error with context
    pub fn config_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}
