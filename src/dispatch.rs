//! Inbound dispatch.
//!
//! Transport I/O threads enqueue raw frames and failures into the
//! connection's mailbox; the worker drains it here. Draining validates
//! the frame headers, decodes the message grammar, performs turn
//! bookkeeping, and invokes the user callback set — always with the state
//! lock released around the callback.
//!
//! The dispatcher is lenient by contract: it always surfaces *something*
//! to the user when it can, and a malformed message never tears down the
//! connection. Only the error mapper produces terminal semantics.

use bytes::Bytes;
use tracing::{debug, error};

use crate::connection::{ConnectionInner, Phase};
use crate::error::{classify_recognition_error, classify_transport_error, ErrorKind};
use crate::events::EventHandler;
use crate::messages::{ServiceMessage, SynthesisStatus, TranslationStatus};
use crate::transport::{headers, Headers, TransportErrorInfo};

/// One mailbox entry, as delivered by the transport.
pub(crate) enum Inbound {
    Data {
        headers: Headers,
        body: Bytes,
        error_code: u32,
    },
    Error(TransportErrorInfo),
}

impl ConnectionInner {
    /// Drain and dispatch everything currently in the mailbox.
    pub(crate) fn drain_mailbox(&self) {
        loop {
            let item = self.mailbox.lock().pop_front();
            match item {
                Some(Inbound::Data {
                    headers,
                    body,
                    error_code,
                }) => self.dispatch_data(&headers, body, error_code),
                Some(Inbound::Error(info)) => self.dispatch_transport_error(&info),
                None => return,
            }
        }
    }

    /// Invoke one user callback, serialized on the worker and with no
    /// lock held. Nothing is delivered once the connection has left the
    /// connected phase.
    fn deliver<F>(&self, f: F)
    where
        F: FnOnce(&dyn EventHandler),
    {
        let handler = {
            let state = self.state.lock();
            if state.phase != Phase::Connected {
                return;
            }
            state.handler.clone()
        };
        if let Some(handler) = handler {
            f(handler.as_ref());
        }
    }

    pub(crate) fn deliver_error(&self, recoverable: bool, kind: ErrorKind, message: &str) {
        error!(ts = self.elapsed_ms(), kind = ?kind, recoverable, "{message}");
        self.deliver(|handler| handler.on_error(recoverable, kind, message));
    }

    /// A transport failure is terminal for this connection: classify it,
    /// tell the user, then move to the terminal phase so further frames
    /// and sends go nowhere.
    fn dispatch_transport_error(&self, info: &TransportErrorInfo) {
        debug!(
            ts = self.elapsed_ms(),
            reason = ?info.reason,
            code = info.error_code,
            detail = %info.message,
            "transport error"
        );
        let (kind, message) = classify_transport_error(info);
        self.deliver_error(true, kind, &message);
        self.terminate();
    }

    fn dispatch_data(&self, frame_headers: &Headers, body: Bytes, error_code: u32) {
        if error_code != 0 {
            error!("Response error {error_code}.");
            return;
        }

        let request_id = frame_headers.get(headers::REQUEST_ID).unwrap_or_default();
        let known = {
            let state = self.state.lock();
            state.registry.is_active(request_id)
        };
        if request_id.is_empty() || !known {
            protocol_violation!(
                "unexpected request id '{}', path: {}",
                request_id,
                frame_headers.get(headers::PATH).unwrap_or_default()
            );
            self.telemetry.record_unexpected_request_id(request_id);
            return;
        }

        let path_value = match frame_headers.get(headers::PATH) {
            Some(p) => p,
            None => {
                protocol_violation!("response is missing the '{}' header", headers::PATH);
                return;
            }
        };

        let content_type = frame_headers.get(headers::CONTENT_TYPE);
        if !body.is_empty() && content_type.is_none() {
            protocol_violation!("response '{path_value}' contains a body with no content type");
            return;
        }

        self.telemetry.record_received_message(request_id, path_value);
        debug!(
            ts = self.elapsed_ms(),
            path = %path_value,
            content_type = content_type.unwrap_or_default(),
            size = body.len(),
            "inbound message"
        );

        let message = match ServiceMessage::decode(path_value, content_type.unwrap_or_default(), &body)
        {
            Ok(message) => message,
            Err(e) => {
                protocol_violation!("failed to decode '{path_value}' message: {e}");
                return;
            }
        };

        self.dispatch_message(request_id, message);
    }

    fn dispatch_message(&self, request_id: &str, message: ServiceMessage) {
        match message {
            ServiceMessage::TranslationSynthesis(event) => {
                self.deliver(|h| h.on_translation_synthesis(event));
            }
            ServiceMessage::SpeechStartDetected(event) => {
                self.deliver(|h| h.on_speech_start_detected(event));
            }
            ServiceMessage::SpeechEndDetected(event) => {
                self.deliver(|h| h.on_speech_end_detected(event));
            }
            ServiceMessage::TurnStart(event) => {
                self.deliver(|h| h.on_turn_start(event));
            }
            ServiceMessage::TurnEnd => {
                {
                    let mut state = self.state.lock();
                    state.registry.complete(request_id);
                }
                // Flush telemetry before the turn-end callback so the
                // record reaches the service inside the turn.
                if let Some(record) = self.telemetry.flush(request_id) {
                    let mut state = self.state.lock();
                    if let Some(transport) = state.transport.as_mut() {
                        let _ = transport.write_telemetry(&record, request_id);
                    }
                }
                self.deliver(|h| h.on_turn_end());
            }
            ServiceMessage::SpeechHypothesis(event) => {
                self.deliver(|h| h.on_speech_hypothesis(event));
            }
            ServiceMessage::SpeechFragment(event) => {
                self.deliver(|h| h.on_speech_fragment(event));
            }
            ServiceMessage::SpeechPhrase(event) => {
                if event.status.emits_phrase() {
                    self.deliver(|h| h.on_speech_phrase(event));
                } else {
                    let (kind, message) = classify_recognition_error(event.status, &event.json);
                    self.deliver_error(false, kind, &message);
                }
            }
            ServiceMessage::TranslationHypothesis(event) => {
                self.deliver(|h| h.on_translation_hypothesis(event));
            }
            ServiceMessage::TranslationPhrase(event) => {
                if !event.status.emits_phrase() {
                    let (kind, message) = classify_recognition_error(event.status, &event.json);
                    self.deliver_error(false, kind, &message);
                } else if event.translation.status == TranslationStatus::Success {
                    self.deliver(|h| h.on_translation_phrase(event));
                }
                // A failed translation on an otherwise successful phrase
                // is dropped: violations were already logged while
                // decoding.
            }
            ServiceMessage::TranslationSynthesisEnd(event) => {
                if event.status == SynthesisStatus::Success {
                    self.deliver(|h| h.on_translation_synthesis_end(event));
                } else {
                    self.deliver_error(false, ErrorKind::ServiceError, &event.failure_reason);
                }
            }
            ServiceMessage::User(event) => {
                self.deliver(|h| h.on_user_message(event));
            }
        }
    }
}
