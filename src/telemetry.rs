//! Per-request telemetry.
//!
//! The connection records what happened for each request id — messages
//! received, audio stream start and end — and flushes one JSON record per
//! turn through [`Transport::write_telemetry`](crate::transport::Transport::write_telemetry)
//! when the service closes the turn.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

pub(crate) struct Telemetry {
    connection_id: String,
    started: Instant,
    inner: Mutex<TelemetryState>,
}

#[derive(Default)]
struct TelemetryState {
    requests: HashMap<String, RequestTelemetry>,
    unexpected_request_ids: u64,
    audio_bytes: u64,
}

#[derive(Default, Serialize)]
#[serde(rename_all = "PascalCase")]
struct RequestTelemetry {
    received_messages: Vec<ReceivedMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_start_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_end_ms: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ReceivedMessage {
    path: String,
    at_ms: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TelemetryRecord<'a> {
    connection_id: &'a str,
    request_id: &'a str,
    #[serde(flatten)]
    request: &'a RequestTelemetry,
}

impl Telemetry {
    pub(crate) fn new(connection_id: String) -> Self {
        Self {
            connection_id,
            started: Instant::now(),
            inner: Mutex::new(TelemetryState::default()),
        }
    }

    /// Milliseconds since the connection was created.
    pub(crate) fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Record the connection startup together with the device identity.
    pub(crate) fn device_startup(&self, device_uuid: &str) {
        info!(
            connection_id = %self.connection_id,
            device_uuid = %device_uuid,
            "connection starting"
        );
    }

    /// Register a freshly created request id.
    pub(crate) fn record_request(&self, request_id: &str) {
        self.inner
            .lock()
            .requests
            .entry(request_id.to_string())
            .or_default();
    }

    pub(crate) fn record_received_message(&self, request_id: &str, path: &str) {
        let at_ms = self.elapsed_ms();
        self.inner
            .lock()
            .requests
            .entry(request_id.to_string())
            .or_default()
            .received_messages
            .push(ReceivedMessage {
                path: path.to_string(),
                at_ms,
            });
    }

    pub(crate) fn record_audio_start(&self, request_id: &str) {
        let at_ms = self.elapsed_ms();
        self.inner
            .lock()
            .requests
            .entry(request_id.to_string())
            .or_default()
            .audio_start_ms = Some(at_ms);
    }

    pub(crate) fn record_audio_end(&self, request_id: &str) {
        let at_ms = self.elapsed_ms();
        self.inner
            .lock()
            .requests
            .entry(request_id.to_string())
            .or_default()
            .audio_end_ms = Some(at_ms);
    }

    pub(crate) fn record_audio_bytes(&self, bytes: u64) {
        self.inner.lock().audio_bytes += bytes;
    }

    pub(crate) fn record_unexpected_request_id(&self, request_id: &str) {
        debug!(request_id = %request_id, "dropping message with unexpected request id");
        self.inner.lock().unexpected_request_ids += 1;
    }

    /// Serialize and forget the record of one request. `None` when the
    /// request id never produced telemetry.
    pub(crate) fn flush(&self, request_id: &str) -> Option<Vec<u8>> {
        let request = self.inner.lock().requests.remove(request_id)?;
        let record = TelemetryRecord {
            connection_id: &self.connection_id,
            request_id,
            request: &request,
        };
        match serde_json::to_vec(&record) {
            Ok(bytes) => {
                debug!(request_id = %request_id, size = bytes.len(), "flushing telemetry");
                Some(bytes)
            }
            Err(e) => {
                debug!(request_id = %request_id, error = %e, "failed to serialize telemetry");
                None
            }
        }
    }
}
