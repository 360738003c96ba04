//! The wire message grammar.
//!
//! Inbound frames carry a `Path` header naming the operation and either a
//! JSON body or, for synthesized audio, raw bytes. [`ServiceMessage::decode`]
//! turns one frame into a tagged variant so the dispatcher reduces to a
//! single exhaustive match.
//!
//! Parsing is deliberately lenient: a malformed body or an unknown status
//! string is a protocol violation — logged and dropped (or mapped to
//! [`RecognitionStatus::InvalidMessage`]) — never a reason to tear down
//! the connection.

use std::collections::HashMap;

use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;

use crate::events::{
    SpeechDetected, SpeechPhrase, SpeechResult, TranslationHypothesis, TranslationPhrase,
    TranslationResult, TranslationSynthesis, TranslationSynthesisEnd, TurnStart, UserMessage,
};

/// Protocol paths.
pub mod path {
    /// Inbound binary frames with synthesized translation audio.
    pub const TRANSLATION_SYNTHESIS: &str = "audio";
    pub const SPEECH_START_DETECTED: &str = "speech.startDetected";
    pub const SPEECH_END_DETECTED: &str = "speech.endDetected";
    pub const TURN_START: &str = "turn.start";
    pub const TURN_END: &str = "turn.end";
    pub const SPEECH_HYPOTHESIS: &str = "speech.hypothesis";
    pub const SPEECH_FRAGMENT: &str = "speech.fragment";
    pub const SPEECH_PHRASE: &str = "speech.phrase";
    pub const TRANSLATION_HYPOTHESIS: &str = "translation.hypothesis";
    pub const TRANSLATION_PHRASE: &str = "translation.phrase";
    pub const TRANSLATION_SYNTHESIS_END: &str = "translation.synthesis.end";

    /// Outbound chunked audio stream path.
    pub const AUDIO_STREAM: &str = "/audio";
}

/// Kind of an outbound protocol message.
///
/// `Config` is the only kind sent without an `X-RequestId`; `Context`
/// opens a speech turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Config,
    Context,
    Agent,
    Ssml,
    Other,
}

// =============================================================================
// Status decode tables
// =============================================================================

/// Outcome of a recognition attempt, from `RecognitionStatus` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionStatus {
    Success,
    NoMatch,
    InitialSilenceTimeout,
    InitialBabbleTimeout,
    Error,
    EndOfDictation,
    TooManyRequests,
    BadRequest,
    Forbidden,
    ServiceUnavailable,
    /// The message carried an unknown or missing status.
    InvalidMessage,
}

impl RecognitionStatus {
    /// Decode a wire status string. Unknown strings are a protocol
    /// violation and map to [`RecognitionStatus::InvalidMessage`].
    pub fn from_wire(s: &str) -> Self {
        match s {
            "Success" => Self::Success,
            "NoMatch" => Self::NoMatch,
            "InitialSilenceTimeout" => Self::InitialSilenceTimeout,
            "BabbleTimeout" => Self::InitialBabbleTimeout,
            "Error" => Self::Error,
            "EndOfDictation" => Self::EndOfDictation,
            "TooManyRequests" => Self::TooManyRequests,
            "BadRequest" => Self::BadRequest,
            "Forbidden" => Self::Forbidden,
            "ServiceUnavailable" => Self::ServiceUnavailable,
            other => {
                protocol_violation!("unknown RecognitionStatus: {other}");
                Self::InvalidMessage
            }
        }
    }

    /// The wire string this status decodes from, `None` for
    /// [`RecognitionStatus::InvalidMessage`]. Note the asymmetric pair:
    /// `InitialBabbleTimeout` travels as `BabbleTimeout`.
    pub fn wire_str(&self) -> Option<&'static str> {
        match self {
            Self::Success => Some("Success"),
            Self::NoMatch => Some("NoMatch"),
            Self::InitialSilenceTimeout => Some("InitialSilenceTimeout"),
            Self::InitialBabbleTimeout => Some("BabbleTimeout"),
            Self::Error => Some("Error"),
            Self::EndOfDictation => Some("EndOfDictation"),
            Self::TooManyRequests => Some("TooManyRequests"),
            Self::BadRequest => Some("BadRequest"),
            Self::Forbidden => Some("Forbidden"),
            Self::ServiceUnavailable => Some("ServiceUnavailable"),
            Self::InvalidMessage => None,
        }
    }

    /// Statuses that still produce a phrase event rather than an error.
    pub(crate) fn emits_phrase(&self) -> bool {
        matches!(
            self,
            Self::Success
                | Self::InitialSilenceTimeout
                | Self::InitialBabbleTimeout
                | Self::NoMatch
                | Self::EndOfDictation
        )
    }
}

impl<'de> Deserialize<'de> for RecognitionStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&s))
    }
}

/// Outcome of the translation part of a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationStatus {
    Success,
    Error,
    InvalidMessage,
}

impl TranslationStatus {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "Success" => Self::Success,
            "Error" => Self::Error,
            other => {
                protocol_violation!("unknown TranslationStatus: {other}");
                Self::InvalidMessage
            }
        }
    }

    pub fn wire_str(&self) -> Option<&'static str> {
        match self {
            Self::Success => Some("Success"),
            Self::Error => Some("Error"),
            Self::InvalidMessage => None,
        }
    }
}

/// Outcome of a translation synthesis stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisStatus {
    Success,
    Error,
    InvalidMessage,
}

impl SynthesisStatus {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "Success" => Self::Success,
            "Error" => Self::Error,
            other => {
                protocol_violation!("unknown SynthesisStatus: {other}");
                Self::InvalidMessage
            }
        }
    }
}

// =============================================================================
// Raw payloads
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DetectedPayload {
    // Sometimes missing or null on the end-detected message.
    #[serde(default)]
    offset: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TurnStartPayload {
    context: TurnContextPayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TurnContextPayload {
    tag: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SpeechResultPayload {
    offset: u64,
    duration: u64,
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NBestPayload {
    confidence: f64,
    display: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PhrasePayload {
    recognition_status: RecognitionStatus,
    offset: u64,
    duration: u64,
    #[serde(default)]
    display_text: Option<String>,
    #[serde(default, rename = "NBest")]
    n_best: Option<Vec<NBestPayload>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TranslationEntryPayload {
    #[serde(default)]
    language: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TranslationSectionPayload {
    #[serde(default)]
    translation_status: Option<String>,
    #[serde(default)]
    failure_reason: Option<String>,
    #[serde(default)]
    translations: Vec<TranslationEntryPayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TranslationHypothesisPayload {
    offset: u64,
    duration: u64,
    #[serde(default)]
    text: String,
    translation: TranslationSectionPayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TranslationPhrasePayload {
    recognition_status: RecognitionStatus,
    offset: u64,
    duration: u64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    translation: Option<TranslationSectionPayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SynthesisEndPayload {
    #[serde(default)]
    synthesis_status: Option<String>,
    #[serde(default)]
    failure_reason: Option<String>,
}

// =============================================================================
// Decoding
// =============================================================================

/// A frame the grammar could not decode. Dispatch logs these as protocol
/// violations and drops the frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("payload is not valid UTF-8")]
    NotUtf8,
}

/// One inbound protocol message, tagged by its `Path` header.
#[derive(Debug, Clone)]
pub enum ServiceMessage {
    SpeechStartDetected(SpeechDetected),
    SpeechEndDetected(SpeechDetected),
    TurnStart(TurnStart),
    TurnEnd,
    SpeechHypothesis(SpeechResult),
    SpeechFragment(SpeechResult),
    SpeechPhrase(SpeechPhrase),
    TranslationHypothesis(TranslationHypothesis),
    TranslationPhrase(TranslationPhrase),
    TranslationSynthesis(TranslationSynthesis),
    TranslationSynthesisEnd(TranslationSynthesisEnd),
    /// Unknown path, forwarded verbatim.
    User(UserMessage),
}

impl ServiceMessage {
    /// Decode one frame. `content_type` is only carried through for
    /// unknown-path passthrough.
    pub fn decode(path: &str, content_type: &str, body: &Bytes) -> Result<Self, DecodeError> {
        if path == path::TRANSLATION_SYNTHESIS {
            return Ok(Self::TranslationSynthesis(TranslationSynthesis {
                audio: body.clone(),
            }));
        }

        match path {
            path::SPEECH_START_DETECTED | path::SPEECH_END_DETECTED => {
                let raw = body_str(body)?;
                let payload: DetectedPayload = serde_json::from_str(raw)?;
                let event = SpeechDetected {
                    json: raw.to_string(),
                    offset: payload.offset.unwrap_or(0),
                };
                if path == path::SPEECH_START_DETECTED {
                    Ok(Self::SpeechStartDetected(event))
                } else {
                    Ok(Self::SpeechEndDetected(event))
                }
            }
            path::TURN_START => {
                let raw = body_str(body)?;
                let payload: TurnStartPayload = serde_json::from_str(raw)?;
                Ok(Self::TurnStart(TurnStart {
                    json: raw.to_string(),
                    tag: payload.context.tag,
                }))
            }
            path::TURN_END => Ok(Self::TurnEnd),
            path::SPEECH_HYPOTHESIS | path::SPEECH_FRAGMENT => {
                let raw = body_str(body)?;
                let payload: SpeechResultPayload = serde_json::from_str(raw)?;
                let event = SpeechResult {
                    json: raw.to_string(),
                    offset: payload.offset,
                    duration: payload.duration,
                    text: payload.text,
                };
                if path == path::SPEECH_HYPOTHESIS {
                    Ok(Self::SpeechHypothesis(event))
                } else {
                    Ok(Self::SpeechFragment(event))
                }
            }
            path::SPEECH_PHRASE => {
                let raw = body_str(body)?;
                let payload: PhrasePayload = serde_json::from_str(raw)?;
                let display_text = if payload.recognition_status == RecognitionStatus::Success {
                    decode_display_text(&payload)?
                } else {
                    String::new()
                };
                Ok(Self::SpeechPhrase(SpeechPhrase {
                    json: raw.to_string(),
                    offset: payload.offset,
                    duration: payload.duration,
                    status: payload.recognition_status,
                    display_text,
                }))
            }
            path::TRANSLATION_HYPOTHESIS => {
                let raw = body_str(body)?;
                let payload: TranslationHypothesisPayload = serde_json::from_str(raw)?;
                let mut translation = retrieve_translation(&payload.translation, false, raw);
                // The hypothesis message never carries a status.
                translation.status = TranslationStatus::Success;
                Ok(Self::TranslationHypothesis(TranslationHypothesis {
                    json: raw.to_string(),
                    offset: payload.offset,
                    duration: payload.duration,
                    text: payload.text,
                    translation,
                }))
            }
            path::TRANSLATION_PHRASE => {
                let raw = body_str(body)?;
                let payload: TranslationPhrasePayload = serde_json::from_str(raw)?;
                let translation = match payload.recognition_status {
                    RecognitionStatus::Success => match &payload.translation {
                        Some(section) => retrieve_translation(section, true, raw),
                        None => return Err(DecodeError::MissingField("Translation")),
                    },
                    RecognitionStatus::InitialSilenceTimeout
                    | RecognitionStatus::InitialBabbleTimeout
                    | RecognitionStatus::NoMatch
                    | RecognitionStatus::EndOfDictation => TranslationResult {
                        status: TranslationStatus::Success,
                        failure_reason: String::new(),
                        translations: HashMap::new(),
                    },
                    _ => TranslationResult {
                        status: TranslationStatus::Error,
                        failure_reason: String::new(),
                        translations: HashMap::new(),
                    },
                };
                Ok(Self::TranslationPhrase(TranslationPhrase {
                    json: raw.to_string(),
                    offset: payload.offset,
                    duration: payload.duration,
                    text: payload.text,
                    translation,
                    status: payload.recognition_status,
                }))
            }
            path::TRANSLATION_SYNTHESIS_END => {
                let raw = body_str(body)?;
                let payload: SynthesisEndPayload = serde_json::from_str(raw)?;
                Ok(Self::TranslationSynthesisEnd(decode_synthesis_end(&payload, raw)))
            }
            _ => Ok(Self::User(UserMessage {
                path: path.to_string(),
                content_type: content_type.to_string(),
                body: body.clone(),
            })),
        }
    }
}

fn body_str(body: &Bytes) -> Result<&str, DecodeError> {
    if body.is_empty() {
        return Ok("{}");
    }
    std::str::from_utf8(body).map_err(|_| DecodeError::NotUtf8)
}

/// `DisplayText` when present (simple format), otherwise the `Display` of
/// the highest-confidence `NBest` entry.
fn decode_display_text(payload: &PhrasePayload) -> Result<String, DecodeError> {
    if let Some(text) = &payload.display_text {
        return Ok(text.clone());
    }
    let entries = payload
        .n_best
        .as_ref()
        .ok_or(DecodeError::MissingField("NBest"))?;
    let mut best_confidence = 0.0;
    let mut display = String::new();
    for entry in entries {
        if entry.confidence > best_confidence {
            best_confidence = entry.confidence;
            display = entry.display.clone();
        }
    }
    Ok(display)
}

/// Read the `Translation` section of a message. `expect_status` is true
/// for `translation.phrase`, where the section carries its own status;
/// the hypothesis message has none and the caller forces `Success`.
fn retrieve_translation(
    section: &TranslationSectionPayload,
    expect_status: bool,
    raw: &str,
) -> TranslationResult {
    let mut result = TranslationResult {
        status: TranslationStatus::Success,
        failure_reason: String::new(),
        translations: HashMap::new(),
    };

    if expect_status {
        match &section.translation_status {
            Some(status) => result.status = TranslationStatus::from_wire(status),
            None => {
                protocol_violation!("no TranslationStatus is provided. json: {raw}");
                result.status = TranslationStatus::InvalidMessage;
                result.failure_reason =
                    format!("Status is missing in the protocol message. Response text:{raw}");
            }
        }
        if let Some(reason) = &section.failure_reason {
            result.failure_reason.push_str(reason);
        }
        if result.status != TranslationStatus::Success {
            return result;
        }
    }

    for entry in &section.translations {
        if entry.language.is_empty() && entry.text.is_empty() {
            protocol_violation!("empty language and text fields in a translations entry");
            continue;
        }
        result
            .translations
            .insert(entry.language.clone(), entry.text.clone());
    }
    if result.translations.is_empty() {
        protocol_violation!("no translations text block in the message. json: {raw}");
    }

    result
}

fn decode_synthesis_end(payload: &SynthesisEndPayload, raw: &str) -> TranslationSynthesisEnd {
    let mut local_reason = String::new();
    let status = match &payload.synthesis_status {
        Some(status) => {
            let status = SynthesisStatus::from_wire(status);
            if status == SynthesisStatus::InvalidMessage {
                protocol_violation!("invalid synthesis status in synthesis.end message. json: {raw}");
                local_reason = "Invalid synthesis status in synthesis.end message.".to_string();
            }
            status
        }
        None => {
            protocol_violation!("no synthesis status in synthesis.end message. json: {raw}");
            local_reason = "No synthesis status in synthesis.end message.".to_string();
            SynthesisStatus::InvalidMessage
        }
    };

    let mut failure_reason = local_reason;
    if let Some(reason) = &payload.failure_reason {
        if status == SynthesisStatus::Success {
            protocol_violation!(
                "FailureReason should be empty if SynthesisStatus is success. json: {raw}"
            );
        }
        failure_reason.push_str(reason);
    }

    TranslationSynthesisEnd {
        status,
        failure_reason,
    }
}

// =============================================================================
// Tests
// =============================================================================
