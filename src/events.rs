//! Events delivered to the application.
//!
//! Every inbound protocol message the dispatcher accepts is surfaced as one
//! of these structures through the [`EventHandler`] callback set. Each
//! JSON-carried event keeps the raw message text in its `json` field
//! alongside the typed fields, so applications can reach fields the typed
//! surface does not model.
//!
//! Callbacks are serialized per connection: no two callbacks run
//! concurrently for the same connection, and none runs while the
//! connection's internal lock is held, so a callback may call back into
//! the send API.

use std::collections::HashMap;

use bytes::Bytes;

use crate::error::ErrorKind;
use crate::messages::{RecognitionStatus, SynthesisStatus, TranslationStatus};

/// `speech.startDetected` / `speech.endDetected`: the service located the
/// beginning or end of speech in the audio stream.
#[derive(Debug, Clone, Default)]
pub struct SpeechDetected {
    /// Raw message JSON.
    pub json: String,
    /// Position in the audio stream, in 100-nanosecond units. Zero when
    /// the message carried no offset.
    pub offset: u64,
}

/// `speech.hypothesis` / `speech.fragment`: an intermediate recognition
/// result whose text may still change.
#[derive(Debug, Clone, Default)]
pub struct SpeechResult {
    pub json: String,
    pub offset: u64,
    pub duration: u64,
    pub text: String,
}

/// `speech.phrase`: a final recognition result for one utterance.
#[derive(Debug, Clone)]
pub struct SpeechPhrase {
    pub json: String,
    pub offset: u64,
    pub duration: u64,
    pub status: RecognitionStatus,
    /// Best display text. Taken from `DisplayText` in simple format, from
    /// the highest-confidence `NBest` entry in detailed format; empty for
    /// the no-speech statuses.
    pub display_text: String,
}

/// `turn.start`: the service opened a turn.
#[derive(Debug, Clone, Default)]
pub struct TurnStart {
    pub json: String,
    /// The service tag echoed from the turn context.
    pub tag: String,
}

/// Translations attached to a hypothesis or phrase.
#[derive(Debug, Clone)]
pub struct TranslationResult {
    pub status: TranslationStatus,
    /// Failure detail accumulated from the message; empty on success.
    pub failure_reason: String,
    /// Target language → translated text.
    pub translations: HashMap<String, String>,
}

/// `translation.hypothesis`: an intermediate recognition result together
/// with its translations so far.
#[derive(Debug, Clone)]
pub struct TranslationHypothesis {
    pub json: String,
    pub offset: u64,
    pub duration: u64,
    pub text: String,
    pub translation: TranslationResult,
}

/// `translation.phrase`: a final recognition result together with its
/// translations.
#[derive(Debug, Clone)]
pub struct TranslationPhrase {
    pub json: String,
    pub offset: u64,
    pub duration: u64,
    pub text: String,
    pub translation: TranslationResult,
    pub status: RecognitionStatus,
}

/// Binary synthesized audio for a translation.
#[derive(Debug, Clone)]
pub struct TranslationSynthesis {
    pub audio: Bytes,
}

/// `translation.synthesis.end`: the synthesized audio stream finished.
#[derive(Debug, Clone)]
pub struct TranslationSynthesisEnd {
    pub status: SynthesisStatus,
    pub failure_reason: String,
}

/// A message on a path the core does not know, forwarded verbatim.
#[derive(Debug, Clone)]
pub struct UserMessage {
    pub path: String,
    pub content_type: String,
    pub body: Bytes,
}

/// The application's callback set.
///
/// Every method has an empty default body, so implementations override
/// only what they consume.
pub trait EventHandler: Send + Sync {
    fn on_speech_start_detected(&self, _event: SpeechDetected) {}
    fn on_speech_end_detected(&self, _event: SpeechDetected) {}
    fn on_speech_hypothesis(&self, _event: SpeechResult) {}
    fn on_speech_fragment(&self, _event: SpeechResult) {}
    fn on_speech_phrase(&self, _event: SpeechPhrase) {}
    fn on_turn_start(&self, _event: TurnStart) {}
    fn on_turn_end(&self) {}
    fn on_translation_hypothesis(&self, _event: TranslationHypothesis) {}
    fn on_translation_phrase(&self, _event: TranslationPhrase) {}
    fn on_translation_synthesis(&self, _event: TranslationSynthesis) {}
    fn on_translation_synthesis_end(&self, _event: TranslationSynthesisEnd) {}
    fn on_user_message(&self, _event: UserMessage) {}

    /// An error surfaced by the connection. `recoverable` is true for
    /// transport-level failures (the caller may build a new connection)
    /// and false for service-level recognition errors.
    fn on_error(&self, _recoverable: bool, _kind: ErrorKind, _message: &str) {}
}
