//! Chat exchanges over a streaming backend
//!
//! A [`ChatSession`] owns one conversation. Each `send` opens a streaming
//! request through the [`RequestExecutor`](crate::recovery::RequestExecutor)
//! and assembles the reply in place with a
//! [`TokenAssembler`](crate::stream::TokenAssembler).

mod session;

pub use session::ChatSession;

use crate::error::TesseraResult;
use crate::stream::{ByteStream, ChatMessage, MessageStatus, Role, SharedMessage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where the text of an exchange came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOrigin {
    Typed,
    Voice,
}

/// One prior turn sent along with a new message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

impl HistoryTurn {
    /// Turn for a finished message; failed and unfinished messages are skipped.
    ///
    /// Interrupted replies are sent without their local notice, and not at
    /// all if nothing arrived before the interruption.
    pub fn from_message(message: &ChatMessage) -> Option<Self> {
        match message.status {
            MessageStatus::Complete => Some(Self {
                role: message.role,
                content: message.content.clone(),
            }),
            MessageStatus::Interrupted => {
                let content = message.streamed_content();
                (!content.is_empty()).then(|| Self {
                    role: message.role,
                    content: content.to_string(),
                })
            }
            _ => None,
        }
    }
}

/// Body of a chat request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
}

/// Streaming chat endpoint
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send `request` and return the response body once a 2xx status arrived.
    ///
    /// Non-2xx statuses must come back as [`TesseraError::Http`](crate::error::TesseraError::Http)
    /// so the executor can classify them.
    async fn open_stream(&self, request: &ChatRequest) -> TesseraResult<ByteStream>;
}

/// How an exchange ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Completed,
    /// Partial reply kept with a notice
    Interrupted,
}

/// Result of a successful `send`
#[derive(Debug, Clone)]
pub struct Exchange {
    pub id: Uuid,
    pub reply: SharedMessage,
    pub outcome: ExchangeOutcome,
    /// Attempts needed to open the stream
    pub attempts: u32,
    /// Whether the reply was handed to playback
    pub spoken: bool,
}
