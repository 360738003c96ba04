//! End-to-end connection tests over a recording mock transport.
//!
//! The mock implements the `Transport` collaborator contract, records
//! every call, and exposes the event sink the connection installs so
//! tests can inject inbound frames and transport failures.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;

use unispeech::events::{
    SpeechDetected, SpeechPhrase, SpeechResult, TranslationHypothesis, TranslationPhrase,
    TranslationSynthesis, TranslationSynthesisEnd, TurnStart, UserMessage,
};
use unispeech::{
    Authentication, Client, Connection, EndpointKind, ErrorKind, EventHandler, Headers,
    MessageKind, OutputFormat, RecognitionStatus, Transport, TransportErrorInfo,
    TransportErrorReason, TransportEvents, TransportFactory, TransportFailure, UspError,
};

// =============================================================================
// Mock transport
// =============================================================================

#[derive(Default)]
struct TransportLog {
    urls: Mutex<Vec<String>>,
    headers: Mutex<Vec<Vec<(String, String)>>>,
    /// (path, body, request id)
    messages: Mutex<Vec<(String, Vec<u8>, Option<String>)>>,
    prepares: Mutex<Vec<String>>,
    /// (size, request id)
    stream_writes: Mutex<Vec<(usize, String)>>,
    flushes: Mutex<Vec<String>>,
    telemetry_writes: Mutex<Vec<(String, Vec<u8>)>>,
    fail_next_do_work: AtomicBool,
}

impl TransportLog {
    fn message_count(&self) -> usize {
        self.messages.lock().len()
    }

    fn last_request_id(&self) -> String {
        self.messages
            .lock()
            .last()
            .and_then(|(_, _, rid)| rid.clone())
            .expect("last message carries a request id")
    }
}

struct MockTransport {
    log: Arc<TransportLog>,
    sink_slot: Arc<Mutex<Option<Arc<dyn TransportEvents>>>>,
}

impl Transport for MockTransport {
    fn set_event_sink(&mut self, sink: Arc<dyn TransportEvents>) {
        *self.sink_slot.lock() = Some(sink);
    }

    fn do_work(&mut self) -> Result<(), TransportFailure> {
        if self.log.fail_next_do_work.swap(false, Ordering::SeqCst) {
            return Err(TransportFailure("socket poll failed".to_string()));
        }
        Ok(())
    }

    fn message_write(
        &mut self,
        path: &str,
        body: &[u8],
        request_id: Option<&str>,
    ) -> Result<(), TransportFailure> {
        self.log.messages.lock().push((
            path.to_string(),
            body.to_vec(),
            request_id.map(str::to_string),
        ));
        Ok(())
    }

    fn stream_prepare(&mut self, path: &str) -> Result<(), TransportFailure> {
        self.log.prepares.lock().push(path.to_string());
        Ok(())
    }

    fn stream_write(&mut self, body: &[u8], request_id: &str) -> Result<(), TransportFailure> {
        self.log
            .stream_writes
            .lock()
            .push((body.len(), request_id.to_string()));
        Ok(())
    }

    fn stream_flush(&mut self, request_id: &str) -> Result<(), TransportFailure> {
        self.log.flushes.lock().push(request_id.to_string());
        Ok(())
    }

    fn write_telemetry(&mut self, body: &[u8], request_id: &str) -> Result<(), TransportFailure> {
        self.log
            .telemetry_writes
            .lock()
            .push((request_id.to_string(), body.to_vec()));
        Ok(())
    }
}

struct MockFactory {
    log: Arc<TransportLog>,
    sink_slot: Arc<Mutex<Option<Arc<dyn TransportEvents>>>>,
    fail_create: bool,
}

impl TransportFactory for MockFactory {
    fn create(
        &self,
        url: &str,
        headers: &Headers,
        _connection_id: &str,
    ) -> Result<Box<dyn Transport>, TransportFailure> {
        if self.fail_create {
            return Err(TransportFailure("no socket".to_string()));
        }
        self.log.urls.lock().push(url.to_string());
        self.log.headers.lock().push(
            headers
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        );
        Ok(Box::new(MockTransport {
            log: self.log.clone(),
            sink_slot: self.sink_slot.clone(),
        }))
    }
}

// =============================================================================
// Recording event handler
// =============================================================================

#[derive(Default)]
struct Recorder {
    detected: Mutex<Vec<(&'static str, u64)>>,
    hypotheses: Mutex<Vec<SpeechResult>>,
    fragments: Mutex<Vec<SpeechResult>>,
    phrases: Mutex<Vec<SpeechPhrase>>,
    turn_starts: Mutex<Vec<TurnStart>>,
    turn_ends: AtomicUsize,
    translation_hypotheses: Mutex<Vec<TranslationHypothesis>>,
    translation_phrases: Mutex<Vec<TranslationPhrase>>,
    syntheses: Mutex<Vec<TranslationSynthesis>>,
    synthesis_ends: Mutex<Vec<TranslationSynthesisEnd>>,
    user_messages: Mutex<Vec<UserMessage>>,
    errors: Mutex<Vec<(bool, ErrorKind, String)>>,
}

impl EventHandler for Recorder {
    fn on_speech_start_detected(&self, event: SpeechDetected) {
        self.detected.lock().push(("start", event.offset));
    }

    fn on_speech_end_detected(&self, event: SpeechDetected) {
        self.detected.lock().push(("end", event.offset));
    }

    fn on_speech_hypothesis(&self, event: SpeechResult) {
        self.hypotheses.lock().push(event);
    }

    fn on_speech_fragment(&self, event: SpeechResult) {
        self.fragments.lock().push(event);
    }

    fn on_speech_phrase(&self, event: SpeechPhrase) {
        self.phrases.lock().push(event);
    }

    fn on_turn_start(&self, event: TurnStart) {
        self.turn_starts.lock().push(event);
    }

    fn on_turn_end(&self) {
        self.turn_ends.fetch_add(1, Ordering::SeqCst);
    }

    fn on_translation_hypothesis(&self, event: TranslationHypothesis) {
        self.translation_hypotheses.lock().push(event);
    }

    fn on_translation_phrase(&self, event: TranslationPhrase) {
        self.translation_phrases.lock().push(event);
    }

    fn on_translation_synthesis(&self, event: TranslationSynthesis) {
        self.syntheses.lock().push(event);
    }

    fn on_translation_synthesis_end(&self, event: TranslationSynthesisEnd) {
        self.synthesis_ends.lock().push(event);
    }

    fn on_user_message(&self, event: UserMessage) {
        self.user_messages.lock().push(event);
    }

    fn on_error(&self, recoverable: bool, kind: ErrorKind, message: &str) {
        self.errors
            .lock()
            .push((recoverable, kind, message.to_string()));
    }
}

impl Recorder {
    fn event_count(&self) -> usize {
        self.detected.lock().len()
            + self.hypotheses.lock().len()
            + self.fragments.lock().len()
            + self.phrases.lock().len()
            + self.turn_starts.lock().len()
            + self.turn_ends.load(Ordering::SeqCst)
            + self.translation_hypotheses.lock().len()
            + self.translation_phrases.lock().len()
            + self.syntheses.lock().len()
            + self.synthesis_ends.lock().len()
            + self.user_messages.lock().len()
            + self.errors.lock().len()
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    connection: Connection,
    log: Arc<TransportLog>,
    sink_slot: Arc<Mutex<Option<Arc<dyn TransportEvents>>>>,
    recorder: Arc<Recorder>,
}

fn connect() -> Harness {
    connect_with(EndpointKind::Speech)
}

fn connect_with(endpoint: EndpointKind) -> Harness {
    let log = Arc::new(TransportLog::default());
    let sink_slot = Arc::new(Mutex::new(None));
    let recorder = Arc::new(Recorder::default());

    let client = Client::new()
        .with_endpoint(endpoint)
        .with_region("westus")
        .with_language("en-us")
        .with_output_format(OutputFormat::Detailed)
        .with_translation_source_language("en")
        .with_translation_target_languages("de")
        .with_authentication(Authentication::SubscriptionKey("test-key".to_string()))
        .with_event_handler(recorder.clone())
        .with_transport_factory(Arc::new(MockFactory {
            log: log.clone(),
            sink_slot: sink_slot.clone(),
            fail_create: false,
        }));

    let connection = Connection::connect(client).expect("connect");
    Harness {
        connection,
        log,
        sink_slot,
        recorder,
    }
}

impl Harness {
    fn sink(&self) -> Arc<dyn TransportEvents> {
        self.sink_slot.lock().clone().expect("event sink installed")
    }

    fn push_frame(&self, request_id: &str, path: &str, content_type: Option<&str>, body: &[u8]) {
        let mut headers = Headers::new();
        headers.insert("X-RequestId", request_id);
        headers.insert("Path", path);
        if let Some(ct) = content_type {
            headers.insert("Content-Type", ct);
        }
        self.sink()
            .on_data(headers, Bytes::copy_from_slice(body), 0);
    }

    fn push_json(&self, request_id: &str, path: &str, body: &str) {
        self.push_frame(request_id, path, Some("application/json"), body.as_bytes());
    }

    /// Open a turn with a context message and return its request id.
    fn open_turn(&self) -> String {
        self.connection
            .queue_message("speech.context", b"{}", MessageKind::Context)
            .expect("context message");
        self.log.last_request_id()
    }
}

fn wait_until(predicate: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    predicate()
}

// =============================================================================
// Connect / shutdown
// =============================================================================

#[test]
fn test_connect_builds_url_and_auth_header() {
    let harness = connect();
    assert!(harness.connection.is_connected());

    let urls = harness.log.urls.lock();
    assert_eq!(urls.len(), 1);
    assert_eq!(
        urls[0],
        "wss://westus.stt.speech.microsoft.com/speech/recognition/interactive\
         /cognitiveservices/v1?format=detailed&language=en-us"
    );

    let headers = harness.log.headers.lock();
    assert!(headers[0]
        .iter()
        .any(|(n, v)| n == "Ocp-Apim-Subscription-Key" && v == "test-key"));
}

#[test]
fn test_connect_requires_authentication() {
    let client = Client::new()
        .with_event_handler(Arc::new(Recorder::default()))
        .with_transport_factory(Arc::new(MockFactory {
            log: Arc::new(TransportLog::default()),
            sink_slot: Arc::new(Mutex::new(None)),
            fail_create: false,
        }));
    assert!(matches!(
        Connection::connect(client),
        Err(UspError::InvalidArgument(_))
    ));
}

#[test]
fn test_connect_failure_when_transport_create_fails() {
    let client = Client::new()
        .with_region("westus")
        .with_authentication(Authentication::SubscriptionKey("k".to_string()))
        .with_event_handler(Arc::new(Recorder::default()))
        .with_transport_factory(Arc::new(MockFactory {
            log: Arc::new(TransportLog::default()),
            sink_slot: Arc::new(Mutex::new(None)),
            fail_create: true,
        }));
    match Connection::connect(client) {
        Err(UspError::RuntimeError(msg)) => assert!(msg.contains("Failed to create transport")),
        other => panic!("expected RuntimeError, got {other:?}"),
    }
}

#[test]
fn test_shutdown_suppresses_callbacks_and_sends() {
    let harness = connect();
    let rid = harness.open_turn();
    let sends_before = harness.log.message_count();

    harness.connection.shutdown();
    assert!(!harness.connection.is_connected());

    // In-flight frames after shutdown go nowhere.
    harness.push_json(&rid, "turn.start", r#"{"Context":{"Tag":"t"}}"#);
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(harness.recorder.event_count(), 0);

    // Sends become silent no-ops.
    harness
        .connection
        .queue_message("speech.event", b"{}", MessageKind::Other)
        .unwrap();
    harness.connection.queue_audio_segment(&[1, 2, 3]).unwrap();
    assert_eq!(harness.log.message_count(), sends_before);
    assert!(harness.log.prepares.lock().is_empty());
}

// =============================================================================
// Outbound queue and per-turn request ids
// =============================================================================

#[test]
fn test_context_message_assigns_request_id() {
    let harness = connect();
    let rid = harness.open_turn();
    assert_eq!(rid.len(), 32);
    assert!(rid.chars().all(|c| c.is_ascii_hexdigit()));

    let messages = harness.log.messages.lock();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "speech.context");
}

#[test]
fn test_config_message_carries_no_request_id() {
    let harness = connect();
    harness
        .connection
        .queue_message("speech.config", b"{}", MessageKind::Config)
        .unwrap();
    let messages = harness.log.messages.lock();
    assert_eq!(messages[0].2, None);
}

#[test]
fn test_second_context_in_turn_is_logic_error() {
    let harness = connect();
    harness.open_turn();
    let result = harness
        .connection
        .queue_message("speech.context", b"{}", MessageKind::Context);
    assert!(matches!(result, Err(UspError::LogicError(_))));
}

#[test]
fn test_empty_path_is_invalid_argument() {
    let harness = connect();
    let result = harness.connection.queue_message("", b"{}", MessageKind::Other);
    assert!(matches!(result, Err(UspError::InvalidArgument(_))));
}

#[test]
fn test_audio_stream_reuses_turn_request_id() {
    let harness = connect();
    let rid = harness.open_turn();

    harness.connection.queue_audio_segment(&[0u8; 320]).unwrap();
    harness.connection.queue_audio_segment(&[0u8; 320]).unwrap();

    assert_eq!(*harness.log.prepares.lock(), vec!["/audio".to_string()]);
    let writes = harness.log.stream_writes.lock().clone();
    assert_eq!(writes.len(), 2);
    assert!(writes.iter().all(|(size, id)| *size == 320 && *id == rid));

    harness.connection.queue_audio_end().unwrap();
    assert_eq!(*harness.log.flushes.lock(), vec![rid.clone()]);

    // The next segment of the same turn prepares the stream again.
    harness.connection.queue_audio_segment(&[0u8; 160]).unwrap();
    assert_eq!(harness.log.prepares.lock().len(), 2);
}

#[test]
fn test_first_audio_without_context_creates_request_id() {
    let harness = connect();
    harness.connection.queue_audio_segment(&[0u8; 100]).unwrap();

    let writes = harness.log.stream_writes.lock();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].1.len(), 32);
}

#[test]
fn test_empty_audio_segment_equals_audio_end() {
    let fresh = connect();
    // Without an open audio stream both are no-ops.
    fresh.connection.queue_audio_segment(&[]).unwrap();
    fresh.connection.queue_audio_end().unwrap();
    assert!(fresh.log.prepares.lock().is_empty());
    assert!(fresh.log.flushes.lock().is_empty());
    assert!(fresh.log.stream_writes.lock().is_empty());

    // With one, an empty segment flushes exactly like queue_audio_end.
    let streaming = connect();
    let rid = streaming.open_turn();
    streaming.connection.queue_audio_segment(&[0u8; 64]).unwrap();
    streaming.connection.queue_audio_segment(&[]).unwrap();
    assert_eq!(*streaming.log.flushes.lock(), vec![rid]);
    assert_eq!(streaming.log.stream_writes.lock().len(), 1);
}

// =============================================================================
// Inbound dispatch
// =============================================================================

#[test]
fn test_turn_lifecycle_detaches_request_id() {
    let harness = connect();
    let rid = harness.open_turn();

    harness.push_json(&rid, "turn.start", r#"{"Context":{"Tag":"tag-1"}}"#);
    harness.push_json(&rid, "turn.end", "{}");
    assert!(wait_until(|| harness.recorder.turn_ends.load(Ordering::SeqCst) == 1));

    let starts = harness.recorder.turn_starts.lock();
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0].tag, "tag-1");
    drop(starts);

    // Telemetry for the turn was flushed through the transport.
    let telemetry = harness.log.telemetry_writes.lock();
    assert_eq!(telemetry.len(), 1);
    assert_eq!(telemetry[0].0, rid);
    drop(telemetry);

    // The rid is gone: frames for it are dropped now.
    harness.push_json(&rid, "turn.start", r#"{"Context":{"Tag":"late"}}"#);
    std::thread::sleep(Duration::from_millis(250));
    assert_eq!(harness.recorder.turn_starts.lock().len(), 1);

    // And a new context is legal again.
    assert!(harness
        .connection
        .queue_message("speech.context", b"{}", MessageKind::Context)
        .is_ok());
}

#[test]
fn test_unknown_request_id_is_dropped() {
    let harness = connect();
    let rid = harness.open_turn();

    harness.push_json("00000000000000000000000000000000", "turn.start", r#"{"Context":{"Tag":"x"}}"#);
    // Marker frame on the live rid proves the mailbox was drained.
    harness.push_json(&rid, "speech.startDetected", r#"{"Offset":1}"#);
    assert!(wait_until(|| !harness.recorder.detected.lock().is_empty()));

    assert!(harness.recorder.turn_starts.lock().is_empty());
    assert_eq!(harness.recorder.event_count(), 1);
}

#[test]
fn test_body_without_content_type_is_dropped() {
    let harness = connect();
    let rid = harness.open_turn();

    harness.push_frame(&rid, "speech.phrase", None, br#"{"RecognitionStatus":"Success"}"#);
    harness.push_json(&rid, "speech.startDetected", r#"{"Offset":1}"#);
    assert!(wait_until(|| !harness.recorder.detected.lock().is_empty()));

    assert!(harness.recorder.phrases.lock().is_empty());
}

#[test]
fn test_detected_events_tolerate_missing_offset() {
    let harness = connect();
    let rid = harness.open_turn();

    harness.push_json(&rid, "speech.startDetected", r#"{"Offset":5000000}"#);
    harness.push_json(&rid, "speech.endDetected", "{}");
    assert!(wait_until(|| harness.recorder.detected.lock().len() == 2));

    let detected = harness.recorder.detected.lock();
    assert_eq!(detected[0], ("start", 5000000));
    assert_eq!(detected[1], ("end", 0));
}

#[test]
fn test_hypothesis_and_fragment_events() {
    let harness = connect();
    let rid = harness.open_turn();

    harness.push_json(
        &rid,
        "speech.hypothesis",
        r#"{"Text":"hel","Offset":10,"Duration":20}"#,
    );
    harness.push_json(
        &rid,
        "speech.fragment",
        r#"{"Text":"hello","Offset":10,"Duration":40}"#,
    );
    assert!(wait_until(|| !harness.recorder.fragments.lock().is_empty()));

    assert_eq!(harness.recorder.hypotheses.lock()[0].text, "hel");
    assert_eq!(harness.recorder.fragments.lock()[0].text, "hello");
}

#[test]
fn test_phrase_nbest_selects_highest_confidence() {
    let harness = connect();
    let rid = harness.open_turn();

    harness.push_json(
        &rid,
        "speech.phrase",
        r#"{"RecognitionStatus":"Success","Offset":0,"Duration":100,
            "NBest":[{"Confidence":0.5,"Display":"a"},
                     {"Confidence":0.9,"Display":"b"},
                     {"Confidence":0.8,"Display":"c"}]}"#,
    );
    assert!(wait_until(|| !harness.recorder.phrases.lock().is_empty()));

    let phrases = harness.recorder.phrases.lock();
    assert_eq!(phrases[0].status, RecognitionStatus::Success);
    assert_eq!(phrases[0].display_text, "b");
}

#[test]
fn test_phrase_error_status_becomes_error_callback() {
    let harness = connect();
    let rid = harness.open_turn();

    harness.push_json(
        &rid,
        "speech.phrase",
        r#"{"RecognitionStatus":"Error","Offset":0,"Duration":0}"#,
    );
    assert!(wait_until(|| !harness.recorder.errors.lock().is_empty()));

    let errors = harness.recorder.errors.lock();
    assert_eq!(errors[0].0, false);
    assert_eq!(errors[0].1, ErrorKind::ServiceError);
    assert!(errors[0].2.contains("internal error"));
    assert!(harness.recorder.phrases.lock().is_empty());
}

#[test]
fn test_translation_phrase_success() {
    let harness = connect_with(EndpointKind::Translation);
    let rid = harness.open_turn();

    harness.push_json(
        &rid,
        "translation.phrase",
        r#"{"RecognitionStatus":"Success","Offset":1,"Duration":2,"Text":"guten tag",
            "Translation":{"TranslationStatus":"Success",
                           "Translations":[{"Language":"en","Text":"good day"}]}}"#,
    );
    assert!(wait_until(|| !harness
        .recorder
        .translation_phrases
        .lock()
        .is_empty()));

    let phrases = harness.recorder.translation_phrases.lock();
    assert_eq!(phrases[0].text, "guten tag");
    assert_eq!(
        phrases[0].translation.translations.get("en").map(String::as_str),
        Some("good day")
    );
}

#[test]
fn test_translation_phrase_error_status_suppresses_event() {
    let harness = connect_with(EndpointKind::Translation);
    let rid = harness.open_turn();

    harness.push_json(
        &rid,
        "translation.phrase",
        r#"{"RecognitionStatus":"TooManyRequests","Offset":0,"Duration":0,"Text":""}"#,
    );
    assert!(wait_until(|| !harness.recorder.errors.lock().is_empty()));

    let errors = harness.recorder.errors.lock();
    assert_eq!(errors[0].1, ErrorKind::TooManyRequests);
    assert!(harness.recorder.translation_phrases.lock().is_empty());
}

#[test]
fn test_translation_synthesis_audio_passthrough() {
    let harness = connect_with(EndpointKind::Translation);
    let rid = harness.open_turn();

    let audio = [0x52u8, 0x49, 0x46, 0x46, 0x00, 0x01];
    harness.push_frame(&rid, "audio", Some("audio/x-wav"), &audio);
    assert!(wait_until(|| !harness.recorder.syntheses.lock().is_empty()));

    assert_eq!(harness.recorder.syntheses.lock()[0].audio.as_ref(), audio);
}

#[test]
fn test_synthesis_end_without_status_reports_service_error() {
    let harness = connect_with(EndpointKind::Translation);
    let rid = harness.open_turn();

    harness.push_json(&rid, "translation.synthesis.end", "{}");
    assert!(wait_until(|| !harness.recorder.errors.lock().is_empty()));

    let errors = harness.recorder.errors.lock();
    assert_eq!(errors[0].1, ErrorKind::ServiceError);
    assert!(errors[0].2.contains("No synthesis status"));
    assert!(harness.recorder.synthesis_ends.lock().is_empty());
}

#[test]
fn test_unknown_path_forwarded_as_user_message() {
    let harness = connect();
    let rid = harness.open_turn();

    harness.push_frame(&rid, "speech.keyword", Some("text/plain"), b"payload");
    assert!(wait_until(|| !harness.recorder.user_messages.lock().is_empty()));

    let messages = harness.recorder.user_messages.lock();
    assert_eq!(messages[0].path, "speech.keyword");
    assert_eq!(messages[0].content_type, "text/plain");
    assert_eq!(messages[0].body.as_ref(), b"payload");
}

// =============================================================================
// Error mapping and terminal behavior
// =============================================================================

#[test]
fn test_upgrade_401_maps_to_authentication_error() {
    let harness = connect();
    let sends_before = harness.log.message_count();

    harness.sink().on_error(TransportErrorInfo {
        reason: TransportErrorReason::WebSocketUpgrade,
        error_code: 401,
        message: String::new(),
    });
    assert!(wait_until(|| !harness.recorder.errors.lock().is_empty()));

    {
        let errors = harness.recorder.errors.lock();
        assert_eq!(errors[0].0, true);
        assert_eq!(errors[0].1, ErrorKind::AuthenticationError);
        assert!(errors[0].2.contains("(401)"));
    }

    assert!(wait_until(|| !harness.connection.is_connected()));
    harness
        .connection
        .queue_message("speech.event", b"{}", MessageKind::Other)
        .unwrap();
    assert_eq!(harness.log.message_count(), sends_before);
}

#[test]
fn test_remote_close_is_recoverable_connection_error() {
    let harness = connect();

    harness.sink().on_error(TransportErrorInfo {
        reason: TransportErrorReason::RemoteClosed,
        error_code: 1001,
        message: "going away".to_string(),
    });
    assert!(wait_until(|| !harness.recorder.errors.lock().is_empty()));

    let errors = harness.recorder.errors.lock();
    assert_eq!(errors[0].0, true);
    assert_eq!(errors[0].1, ErrorKind::ConnectionError);
    assert!(errors[0].2.contains("going away"));
}

#[test]
fn test_do_work_failure_reports_runtime_error() {
    let harness = connect();

    harness.log.fail_next_do_work.store(true, Ordering::SeqCst);
    // Wake the worker; the failure surfaces on its next pump iteration.
    harness
        .connection
        .queue_message("speech.config", b"{}", MessageKind::Config)
        .unwrap();
    assert!(wait_until(|| !harness.recorder.errors.lock().is_empty()));

    let errors = harness.recorder.errors.lock();
    assert_eq!(errors[0].0, false);
    assert_eq!(errors[0].1, ErrorKind::RuntimeError);
    assert!(errors[0].2.contains("socket poll failed"));

    // The pump keeps running afterwards.
    drop(errors);
    assert!(harness.connection.is_connected());
}
