//! Conversation state and the send path

use super::{
    ChatBackend, ChatRequest, Exchange, ExchangeOutcome, HistoryTurn, InputOrigin,
};
use crate::error::{TesseraError, TesseraResult, UserFriendlyError};
use crate::events::{Event, EventBus};
use crate::recovery::{ErrorClassifier, ExecuteOptions, RequestExecutor, classify_error};
use crate::stream::{ChatMessage, Role, SharedMessage, StreamOutcome, TokenAssembler};
use crate::voice::{SpeechController, VoiceSink};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// One conversation with the chat backend
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    executor: RequestExecutor,
    speech: Option<SpeechController>,
    events: Option<EventBus>,
    connect_timeout: Duration,
    idle_timeout: Duration,
    auto_speak: bool,
    messages: Mutex<Vec<SharedMessage>>,
    current: Mutex<Option<CancellationToken>>,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ChatBackend>, executor: RequestExecutor) -> Self {
        Self {
            backend,
            executor,
            speech: None,
            events: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            auto_speak: true,
            messages: Mutex::new(Vec::new()),
            current: Mutex::new(None),
        }
    }

    /// Playback used for barge-in and for speaking replies to voice input
    pub fn with_speech(mut self, speech: SpeechController) -> Self {
        self.speech = Some(speech);
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// `connect` bounds the wait for the first response, `idle` the gap
    /// between body chunks
    pub fn with_timeouts(mut self, connect: Duration, idle: Duration) -> Self {
        self.connect_timeout = connect;
        self.idle_timeout = idle;
        self
    }

    pub fn with_auto_speak(mut self, auto_speak: bool) -> Self {
        self.auto_speak = auto_speak;
        self
    }

    /// Snapshot of the conversation
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.lock().iter().map(|m| m.read().clone()).collect()
    }

    /// Live handles to the conversation's messages
    pub fn message_handles(&self) -> Vec<SharedMessage> {
        self.messages.lock().clone()
    }

    /// Latest assistant message
    pub fn last_reply(&self) -> Option<ChatMessage> {
        self.messages
            .lock()
            .iter()
            .rev()
            .map(|m| m.read().clone())
            .find(|m| m.role == Role::Assistant)
    }

    pub fn is_busy(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Abort the exchange in flight, keeping whatever was assembled
    pub fn cancel_current(&self) {
        if let Some(token) = self.current.lock().as_ref() {
            token.cancel();
        }
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }

    /// Submit `text` and stream the reply into a new assistant message.
    ///
    /// Errors before the stream opens mark the reply failed and are returned
    /// as the executor produced them. Errors after it opened keep the partial
    /// reply and yield [`ExchangeOutcome::Interrupted`].
    #[instrument(skip(self, text), fields(origin = ?origin))]
    pub async fn send(&self, text: &str, origin: InputOrigin) -> TesseraResult<Exchange> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TesseraError::invalid_input("message is empty"));
        }

        // Barge-in: a new question silences the previous answer.
        if let Some(speech) = &self.speech {
            speech.stop();
        }

        let exchange_id = Uuid::new_v4();
        let reply = ChatMessage::assistant_placeholder().into_shared();
        let request = {
            let mut messages = self.messages.lock();
            let history = messages
                .iter()
                .filter_map(|m| HistoryTurn::from_message(&m.read()))
                .collect();
            messages.push(ChatMessage::user(text).into_shared());
            messages.push(reply.clone());
            ChatRequest {
                message: text.to_string(),
                history,
            }
        };
        let cancel = CancellationToken::new();
        *self.current.lock() = Some(cancel.clone());
        self.publish(Event::ExchangeStarted {
            exchange_id,
            from_voice: origin == InputOrigin::Voice,
        });

        let result = self.run_exchange(exchange_id, &request, &reply, &cancel).await;
        *self.current.lock() = None;
        let (outcome, attempts) = result?;

        let mut spoken = false;
        if outcome == ExchangeOutcome::Completed && origin == InputOrigin::Voice && self.auto_speak {
            if let Some(speech) = &self.speech {
                let content = reply.read().content.clone();
                spoken = speech.speak_reply(exchange_id, content);
            }
        }

        Ok(Exchange {
            id: exchange_id,
            reply,
            outcome,
            attempts,
            spoken,
        })
    }

    async fn run_exchange(
        &self,
        exchange_id: Uuid,
        request: &ChatRequest,
        reply: &SharedMessage,
        cancel: &CancellationToken,
    ) -> TesseraResult<(ExchangeOutcome, u32)> {
        let mut attempts = 0u32;
        let opened = {
            let classifier: &dyn ErrorClassifier<TesseraError> = &classify_error;
            let options = ExecuteOptions::new("chat.stream", self.executor.policy().clone(), classifier)
                .with_notice_token(format!("chat:{exchange_id}"));
            let connect_timeout = self.connect_timeout;
            let attempt = || {
                attempts += 1;
                let backend = self.backend.clone();
                async move {
                    match tokio::time::timeout(connect_timeout, backend.open_stream(request)).await {
                        Ok(result) => result,
                        Err(_) => Err(TesseraError::timeout(
                            "no response from the server",
                            connect_timeout,
                        )),
                    }
                }
            };
            tokio::select! {
                _ = cancel.cancelled() => Err(TesseraError::Cancelled),
                result = self.executor.execute_with(options, attempt) => result,
            }
        };

        let body = match opened {
            Ok(body) => body,
            Err(error) => {
                let notice = UserFriendlyError::from(&error).attempt_summary(attempts);
                tracing::warn!(%exchange_id, attempts, error = %error, "chat request failed");
                reply.write().fail(notice.clone());
                self.publish(Event::ExchangeFailed {
                    exchange_id,
                    notice,
                });
                return Err(error);
            }
        };

        let mut assembler = TokenAssembler::new(reply.clone(), exchange_id);
        if let Some(events) = &self.events {
            assembler = assembler.with_events(events.clone());
        }
        let outcome = match assembler.consume(body, self.idle_timeout, cancel).await {
            StreamOutcome::Completed => ExchangeOutcome::Completed,
            StreamOutcome::Interrupted(_) => ExchangeOutcome::Interrupted,
        };
        Ok((outcome, attempts))
    }

    fn publish(&self, event: Event) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

#[async_trait]
impl VoiceSink for ChatSession {
    async fn submit_voice(&self, transcript: String) {
        if let Err(error) = self.send(&transcript, InputOrigin::Voice).await {
            tracing::warn!(error = %error, "voice exchange failed");
        }
    }
}
