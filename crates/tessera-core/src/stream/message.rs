//! Chat messages assembled from a stream

use super::frame::SourceRef;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Lifecycle of a message within its exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Placeholder created, no token yet
    Pending,
    /// Tokens are arriving
    Streaming,
    /// Stream ended normally
    Complete,
    /// Stream broke after some content; partial content is kept
    Interrupted,
    /// Request failed before streaming started
    Failed,
}

impl MessageStatus {
    /// Frozen messages no longer change
    pub fn is_frozen(&self) -> bool {
        matches!(self, Self::Complete | Self::Interrupted | Self::Failed)
    }
}

/// One message of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    /// Attached at most once per exchange
    pub sources: Option<Vec<SourceRef>>,
    pub status: MessageStatus,
    /// Locally generated failure notice, kept apart from streamed content
    pub notice: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A message shared between the assembler and readers
pub type SharedMessage = Arc<RwLock<ChatMessage>>;

impl ChatMessage {
    /// A user message, complete as soon as it is created
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            content: content.into(),
            sources: None,
            status: MessageStatus::Complete,
            notice: None,
            created_at: Utc::now(),
        }
    }

    /// Empty assistant message shown before the first token arrives
    pub fn assistant_placeholder() -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            content: String::new(),
            sources: None,
            status: MessageStatus::Pending,
            notice: None,
            created_at: Utc::now(),
        }
    }

    pub fn into_shared(self) -> SharedMessage {
        Arc::new(RwLock::new(self))
    }

    /// Append streamed text; ignored once the message is frozen
    pub fn append(&mut self, text: &str) {
        if self.status.is_frozen() {
            return;
        }
        self.content.push_str(text);
        self.status = MessageStatus::Streaming;
    }

    /// Attach sources unless some are already attached.
    ///
    /// Returns whether the sources were attached.
    pub fn attach_sources(&mut self, sources: Vec<SourceRef>) -> bool {
        if self.status.is_frozen() || self.sources.is_some() {
            return false;
        }
        self.sources = Some(sources);
        true
    }

    /// Content as streamed, without a locally appended interruption notice
    pub fn streamed_content(&self) -> &str {
        let (MessageStatus::Interrupted, Some(notice)) = (self.status, self.notice.as_deref()) else {
            return &self.content;
        };
        let marker = format!("[{}]", notice);
        match self.content.strip_suffix(marker.as_str()) {
            Some(rest) => rest.strip_suffix("\n\n").unwrap_or(rest),
            None => &self.content,
        }
    }

    /// Freeze after a normal end of stream
    pub fn complete(&mut self) {
        if !self.status.is_frozen() {
            self.status = MessageStatus::Complete;
        }
    }

    /// Freeze after a mid-stream failure, keeping what was assembled
    pub fn interrupt(&mut self, notice: impl Into<String>) {
        if self.status.is_frozen() {
            return;
        }
        let notice = notice.into();
        if !self.content.is_empty() {
            self.content.push_str("\n\n");
        }
        self.content.push_str(&format!("[{}]", notice));
        self.notice = Some(notice);
        self.status = MessageStatus::Interrupted;
    }

    /// Freeze after the request failed before any content arrived
    pub fn fail(&mut self, notice: impl Into<String>) {
        if self.status.is_frozen() {
            return;
        }
        let notice = notice.into();
        self.content = notice.clone();
        self.notice = Some(notice);
        self.status = MessageStatus::Failed;
    }
}
