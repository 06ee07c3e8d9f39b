//! Error types for the Tessera engine
//!
//! A single error enum covers the network, stream, configuration and input
//! failures of the engine. Voice capture failures use
//! [`crate::voice::CaptureErrorKind`] and never convert into it.

mod constructors;
mod types;
mod user_messages;

pub use types::{TesseraError, TesseraResult};
pub use user_messages::{ErrorCategory, UserFriendlyError};
