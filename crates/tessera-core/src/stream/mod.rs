//! Stream ingestion and token assembly
//!
//! A streaming chat reply arrives as a body of newline-delimited
//! `data: <json>` records in arbitrarily sized binary chunks. This module
//! turns that body into one growing [`ChatMessage`]:
//! - [`LineDecoder`] extracts complete records, never a partial one
//! - [`StreamFrame`] recognises token deltas and sidecar records
//! - [`TokenAssembler`] applies frames to the shared message

mod assembler;
mod decoder;
mod frame;
mod message;

pub use assembler::{ByteStream, StreamOutcome, TokenAssembler};
pub use decoder::LineDecoder;
pub use frame::{DONE_SENTINEL, DATA_PREFIX, SourceRef, StreamFrame};
pub use message::{ChatMessage, MessageStatus, Role, SharedMessage};
