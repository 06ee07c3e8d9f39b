//! User-facing error messages
//!
//! Turns a [`TesseraError`] into the short notice shown next to a chat
//! exchange or in the task panel.

use super::types::TesseraError;

/// Error category for user-facing messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Expired or invalid session
    Authentication,
    /// Rate limiting
    RateLimit,
    /// Request the backend refused to process
    UserInput,
    /// Connectivity or server-side faults
    Network,
    /// Backend is slow to answer, usually a cold start
    ServerStarting,
    /// Reply stopped part-way through
    Interrupted,
    /// Local configuration problems
    Configuration,
    /// User-initiated cancellation
    Cancellation,
    /// Anything else
    Internal,
}

impl ErrorCategory {
    /// Get a user-friendly category name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Authentication => "Authentication Error",
            Self::RateLimit => "Rate Limit Exceeded",
            Self::UserInput => "Request Rejected",
            Self::Network => "Network Error",
            Self::ServerStarting => "Server Starting",
            Self::Interrupted => "Response Interrupted",
            Self::Configuration => "Configuration Error",
            Self::Cancellation => "Cancelled",
            Self::Internal => "Internal Error",
        }
    }
}

/// User-friendly error information
#[derive(Debug, Clone)]
pub struct UserFriendlyError {
    /// The error category
    pub category: ErrorCategory,
    /// One-line summary shown to the user
    pub title: String,
    /// Technical detail
    pub message: String,
    /// Suggested actions to resolve the error
    pub suggestions: Vec<String>,
    /// Original technical error code
    pub error_code: String,
}

impl UserFriendlyError {
    /// Create a new user-friendly error
    pub fn new(
        category: ErrorCategory,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            title: title.into(),
            message: message.into(),
            suggestions: Vec::new(),
            error_code: String::new(),
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Set the technical error code
    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = code.into();
        self
    }

    /// Notice for a request that failed after `attempts` tries
    pub fn attempt_summary(&self, attempts: u32) -> String {
        if attempts > 1 {
            format!("{} (failed after {} attempts)", self.title, attempts)
        } else {
            self.title.clone()
        }
    }

    /// Format the error for display
    pub fn format_display(&self) -> String {
        let mut output = format!(
            "{}: {}\n\n{}",
            self.category.display_name(),
            self.title,
            self.message
        );

        if !self.suggestions.is_empty() {
            output.push_str("\n\nSuggested actions:");
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("\n  {}. {}", i + 1, suggestion));
            }
        }

        output
    }
}

impl From<&TesseraError> for UserFriendlyError {
    fn from(error: &TesseraError) -> Self {
        let message = error.to_string();
        let friendly = match error {
            TesseraError::Http { status_code, .. } => match status_code {
                Some(401) => UserFriendlyError::new(
                    ErrorCategory::Authentication,
                    "Your session has expired. Please sign in again.",
                    message,
                )
                .with_suggestion("Sign in again to continue"),
                Some(403) => UserFriendlyError::new(
                    ErrorCategory::UserInput,
                    "You do not have access to this resource.",
                    message,
                ),
                Some(429) => UserFriendlyError::new(
                    ErrorCategory::RateLimit,
                    "Too many requests. Please wait a moment before trying again.",
                    message,
                ),
                Some(413) => UserFriendlyError::new(
                    ErrorCategory::UserInput,
                    "The message is too large to send.",
                    message,
                )
                .with_suggestion("Shorten the message and try again"),
                Some(code) if *code >= 500 => UserFriendlyError::new(
                    ErrorCategory::Network,
                    "The server ran into a problem.",
                    message,
                ),
                _ => UserFriendlyError::new(
                    ErrorCategory::UserInput,
                    "The request was rejected by the server.",
                    message,
                ),
            },
            TesseraError::Network { .. } => UserFriendlyError::new(
                ErrorCategory::Network,
                "Could not reach the server.",
                message,
            )
            .with_suggestion("Check your network connection"),
            TesseraError::Timeout { .. } => UserFriendlyError::new(
                ErrorCategory::ServerStarting,
                "The server may be starting up. Please try again in a moment.",
                message,
            ),
            TesseraError::Stream { .. } => UserFriendlyError::new(
                ErrorCategory::Interrupted,
                "The response was interrupted.",
                message,
            ),
            TesseraError::Config { .. } => UserFriendlyError::new(
                ErrorCategory::Configuration,
                "Invalid configuration.",
                message,
            ),
            TesseraError::Cancelled => {
                UserFriendlyError::new(ErrorCategory::Cancellation, "Cancelled.", message)
            }
            TesseraError::Json { .. }
            | TesseraError::InvalidInput { .. }
            | TesseraError::Other { .. } => UserFriendlyError::new(
                ErrorCategory::Internal,
                "Something went wrong.",
                message,
            ),
        };
        friendly.with_error_code(error.error_code())
    }
}
