//! Voice capture and reply playback
//!
//! Capture is one explicit state machine ([`VoiceState`]) driven by
//! [`CaptureEvent`]s from a [`CaptureBackend`]. A finished transcript is
//! handed to a [`VoiceSink`] after a short settle delay. Playback of replies
//! is a separate, cooperating state owned by [`SpeechController`]. The
//! [`AudioArbiter`] keeps the two from ever running at the same time.

mod arbiter;
mod controller;
mod speech;

pub use arbiter::{AudioArbiter, AudioKind, AudioLease};
pub use controller::VoiceController;
pub use speech::SpeechController;

use async_trait::async_trait;

/// Capture state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VoiceState {
    #[default]
    Idle,
    /// Microphone open; `hypothesis` is the best recognition so far
    Listening { hypothesis: Option<String> },
    /// Waiting on a post-processing round trip; blocks new starts and edits
    Transcribing { hypothesis: Option<String> },
}

impl VoiceState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening { .. } => "listening",
            Self::Transcribing { .. } => "transcribing",
        }
    }

    /// Best transcript so far, if capturing
    pub fn hypothesis(&self) -> Option<&str> {
        match self {
            Self::Listening { hypothesis } | Self::Transcribing { hypothesis } => {
                hypothesis.as_deref()
            }
            Self::Idle => None,
        }
    }

    fn hypothesis_mut(&mut self) -> Option<&mut Option<String>> {
        match self {
            Self::Listening { hypothesis } | Self::Transcribing { hypothesis } => Some(hypothesis),
            Self::Idle => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Capture failure reported by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureErrorKind {
    /// Microphone permission denied
    NotAllowed,
    /// Nothing was heard; not fatal
    NoSpeech,
    /// Capture was stopped on purpose
    Aborted,
    Other(String),
}

impl CaptureErrorKind {
    /// Notice shown to the user, if any
    pub fn notice(&self) -> Option<&'static str> {
        match self {
            Self::NotAllowed => {
                Some("Microphone access was denied. Allow microphone access to use voice input.")
            }
            Self::NoSpeech => Some("No speech was detected. Try again."),
            Self::Aborted => None,
            Self::Other(_) => Some("Voice input failed. Please try again."),
        }
    }
}

/// Events delivered by a capture device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Incremental recognition result
    Hypothesis(String),
    /// The device is post-processing the recording
    Processing,
    /// Capture ended on its own or after `stop()`
    Ended,
    Error(CaptureErrorKind),
}

/// Microphone and recognizer
pub trait CaptureBackend: Send + Sync {
    fn is_supported(&self) -> bool;

    /// Open the microphone; events follow through [`VoiceController::on_event`]
    fn start(&self) -> Result<(), CaptureErrorKind>;

    fn stop(&self);
}

/// Text-to-speech output
#[async_trait]
pub trait PlaybackBackend: Send + Sync {
    /// Speak `text`, resolving when playback finishes
    async fn speak(&self, text: &str) -> Result<(), String>;

    /// Tear down in-flight playback immediately
    fn stop(&self);
}

/// Where finished transcripts go
#[async_trait]
pub trait VoiceSink: Send + Sync {
    async fn submit_voice(&self, transcript: String);
}

#[cfg(test)]
mod tests;
