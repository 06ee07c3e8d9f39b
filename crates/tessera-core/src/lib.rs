//! Tessera engine core library
//!
//! Client-side streaming and task reconciliation for the Tessera dashboard:
//! resilient request execution, incremental assembly of streamed chat
//! replies, the voice capture state machine, and the task and activity store
//! with its derived per-agent rollups.

pub mod auth;
pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod recovery;
pub mod stream;
pub mod tasks;
pub mod voice;

// Re-export commonly used types
pub use auth::{AuthSession, SessionGuard, SessionState};
pub use chat::{ChatBackend, ChatRequest, ChatSession, Exchange, ExchangeOutcome, InputOrigin};
pub use client::HttpBackend;
pub use config::{ConfigLoader, TesseraConfig};
pub use error::{TesseraError, TesseraResult, UserFriendlyError};
pub use events::{Event, EventBus};
pub use recovery::{ErrorClass, RequestExecutor, RetryNotices, RetryPolicy, TracingInterceptor};
pub use stream::{ChatMessage, MessageStatus, Role, SourceRef, TokenAssembler};
pub use tasks::{
    ActivityLogEntry, AgentRollup, AgentStatus, StatusFilter, Task, TaskBackend, TaskStatus,
    TaskStore, TaskSync,
};
pub use voice::{
    AudioArbiter, CaptureBackend, CaptureErrorKind, CaptureEvent, PlaybackBackend,
    SpeechController, VoiceController, VoiceSink, VoiceState,
};
