//! Applies decoded frames to a chat message

use super::decoder::LineDecoder;
use super::frame::StreamFrame;
use super::message::SharedMessage;
use crate::error::{TesseraError, TesseraResult, UserFriendlyError};
use crate::events::{Event, EventBus};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Body of a streaming response
pub type ByteStream = Pin<Box<dyn Stream<Item = TesseraResult<Bytes>> + Send>>;

/// How an assembled stream ended
#[derive(Debug, Clone)]
pub enum StreamOutcome {
    /// Transport closed normally; the message is complete
    Completed,
    /// The stream broke; partial content was kept with a notice appended
    Interrupted(TesseraError),
}

impl StreamOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Builds one assistant message from one response body
pub struct TokenAssembler {
    decoder: LineDecoder,
    message: SharedMessage,
    exchange_id: Uuid,
    events: Option<EventBus>,
    saw_done: bool,
}

impl TokenAssembler {
    pub fn new(message: SharedMessage, exchange_id: Uuid) -> Self {
        Self {
            decoder: LineDecoder::new(),
            message,
            exchange_id,
            events: None,
            saw_done: false,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Whether the `[DONE]` sentinel has been seen
    pub fn saw_done(&self) -> bool {
        self.saw_done
    }

    /// Feed one body chunk
    pub fn push_chunk(&mut self, chunk: &[u8]) -> TesseraResult<()> {
        let frames = self.decoder.feed(chunk);
        self.apply_all(frames)
    }

    /// Flush residual buffered content at end of body
    pub fn finish(&mut self) -> TesseraResult<()> {
        let frames = self.decoder.finish();
        self.apply_all(frames)
    }

    fn apply_all(&mut self, frames: Vec<StreamFrame>) -> TesseraResult<()> {
        for frame in frames {
            self.apply(frame)?;
        }
        Ok(())
    }

    fn apply(&mut self, frame: StreamFrame) -> TesseraResult<()> {
        match frame {
            StreamFrame::Delta(text) => {
                self.message.write().append(&text);
            }
            StreamFrame::Sources(sources) => {
                let count = sources.len();
                if self.message.write().attach_sources(sources) {
                    tracing::debug!(exchange_id = %self.exchange_id, count, "sources attached");
                    self.publish(Event::SourcesAttached {
                        exchange_id: self.exchange_id,
                        count,
                    });
                } else {
                    tracing::debug!(exchange_id = %self.exchange_id, "repeated sources sidecar ignored");
                }
            }
            StreamFrame::ServerError(message) => {
                return Err(TesseraError::stream(message));
            }
            StreamFrame::Done => {
                self.saw_done = true;
            }
        }
        Ok(())
    }

    /// Read `body` to its end, assembling the message as chunks arrive.
    ///
    /// A gap longer than `idle_timeout` between chunks, a transport error, an
    /// error sidecar or cancellation interrupts the exchange. Content already
    /// assembled stays in the message, followed by a notice.
    pub async fn consume(
        &mut self,
        mut body: ByteStream,
        idle_timeout: Duration,
        cancel: &CancellationToken,
    ) -> StreamOutcome {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return self.interrupt(TesseraError::Cancelled);
                }
                next = tokio::time::timeout(idle_timeout, body.next()) => next,
            };

            let chunk = match next {
                Err(_) => {
                    return self.interrupt(TesseraError::timeout(
                        "no data received from the stream",
                        idle_timeout,
                    ));
                }
                Ok(None) => break,
                Ok(Some(Err(error))) => return self.interrupt(error),
                Ok(Some(Ok(chunk))) => chunk,
            };

            if let Err(error) = self.push_chunk(&chunk) {
                return self.interrupt(error);
            }
        }

        if let Err(error) = self.finish() {
            return self.interrupt(error);
        }
        if self.decoder.discarded() > 0 {
            tracing::warn!(
                exchange_id = %self.exchange_id,
                discarded = self.decoder.discarded(),
                "stream records could not be parsed"
            );
        }

        let length = {
            let mut message = self.message.write();
            message.complete();
            message.content.len()
        };
        tracing::info!(exchange_id = %self.exchange_id, length, saw_done = self.saw_done, "stream completed");
        self.publish(Event::ExchangeCompleted {
            exchange_id: self.exchange_id,
            length,
        });
        StreamOutcome::Completed
    }

    fn interrupt(&mut self, error: TesseraError) -> StreamOutcome {
        let notice = match &error {
            TesseraError::Cancelled => "Response stopped.".to_string(),
            TesseraError::Timeout { .. } => {
                "The response stalled and was stopped.".to_string()
            }
            other => UserFriendlyError::from(other).title,
        };
        tracing::warn!(exchange_id = %self.exchange_id, error = %error, "stream interrupted");
        self.decoder.clear();
        self.message.write().interrupt(notice.clone());
        self.publish(Event::ExchangeInterrupted {
            exchange_id: self.exchange_id,
            notice,
        });
        StreamOutcome::Interrupted(error)
    }

    fn publish(&self, event: Event) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}
