//! The WebSocket transport collaborator contract.
//!
//! The connection core does not implement WebSocket framing, TLS, or the
//! HTTP upgrade itself. It drives a [`Transport`] supplied through a
//! [`TransportFactory`] and receives inbound frames and failures through
//! the [`TransportEvents`] sink it installs.
//!
//! A transport is free to invoke the sink from its own I/O threads or from
//! inside [`Transport::do_work`]; the sink only enqueues, so either is
//! safe.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

/// Header names used on the connection handshake and on protocol frames.
pub mod headers {
    /// Identifies the operation carried by a protocol frame.
    pub const PATH: &str = "Path";
    /// Correlates a frame with the request that produced it.
    pub const REQUEST_ID: &str = "X-RequestId";
    /// MIME type of a non-empty frame body.
    pub const CONTENT_TYPE: &str = "Content-Type";

    pub const OCP_APIM_SUBSCRIPTION_KEY: &str = "Ocp-Apim-Subscription-Key";
    pub const AUTHORIZATION: &str = "Authorization";
    pub const SEARCH_DELEGATION_RPS_TOKEN: &str = "X-Search-DelegationRPSToken";
    pub const OUTPUT_AUDIO_CODEC: &str = "X-Output-AudioCodec";
    pub const USER_AGENT: &str = "User-Agent";
}

/// An ordered name/value header map with case-insensitive lookup.
///
/// Used both for the handshake headers handed to the transport and for the
/// response headers of inbound frames.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing any existing value for the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        for entry in &mut self.entries {
            if entry.0.eq_ignore_ascii_case(&name) {
                entry.1 = value;
                return;
            }
        }
        self.entries.push((name, value));
    }

    /// Look up a header value by name, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// Failure classes reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorReason {
    /// The remote host closed the connection.
    RemoteClosed,
    /// The remote host could not be reached.
    ConnectionFailure,
    /// The HTTP upgrade to WebSocket failed; `error_code` carries the HTTP
    /// status.
    WebSocketUpgrade,
    /// Sending a WebSocket frame failed.
    WebSocketSendFrame,
    /// Any other WebSocket-level failure.
    WebSocketError,
    /// Host name resolution failed.
    DnsFailure,
    /// The transport could not classify the failure.
    Unknown,
}

/// Details of a transport failure delivered through [`TransportEvents`].
#[derive(Debug, Clone)]
pub struct TransportErrorInfo {
    pub reason: TransportErrorReason,
    /// Reason-specific code: an HTTP status for upgrade failures, an
    /// internal error code otherwise.
    pub error_code: u32,
    /// Transport-supplied detail text, possibly empty.
    pub message: String,
}

/// Synchronous failure of a single transport operation.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransportFailure(pub String);

/// Sink for inbound frames and failures, installed by the connection.
///
/// Implementations enqueue and return quickly; they never block on user
/// callbacks.
pub trait TransportEvents: Send + Sync {
    /// A complete inbound frame: response headers, body, and the
    /// transport's per-frame error code (zero on success).
    fn on_data(&self, headers: Headers, body: Bytes, error_code: u32);

    /// A transport-level failure. The connection treats these as terminal.
    fn on_error(&self, error: TransportErrorInfo);
}

/// Host-resolution cache attached to the transport on platforms that need
/// one. Provided by the transport collaborator; the connection only owns
/// and attaches it.
pub trait DnsCache: Send + Sync {}

/// One WebSocket session to the speech service.
///
/// All methods are called with the connection's state lock held, so
/// implementations need no internal synchronization for them; the
/// [`TransportEvents`] sink is the only concurrent entry point back into
/// the core.
pub trait Transport: Send {
    /// Install the sink that receives inbound frames and failures.
    fn set_event_sink(&mut self, sink: Arc<dyn TransportEvents>);

    /// Attach a DNS cache. Transports that do their own resolution may
    /// ignore it.
    fn set_dns_cache(&mut self, _cache: Arc<dyn DnsCache>) {}

    /// Drive transport I/O. Called repeatedly from the worker pump.
    fn do_work(&mut self) -> Result<(), TransportFailure>;

    /// Write a protocol message. `request_id`, when present, becomes the
    /// frame's `X-RequestId` header.
    fn message_write(
        &mut self,
        path: &str,
        body: &[u8],
        request_id: Option<&str>,
    ) -> Result<(), TransportFailure>;

    /// Open the chunked audio stream for the given path.
    fn stream_prepare(&mut self, path: &str) -> Result<(), TransportFailure>;

    /// Write one audio chunk on the prepared stream.
    fn stream_write(&mut self, body: &[u8], request_id: &str) -> Result<(), TransportFailure>;

    /// Terminate the audio stream for the given request.
    fn stream_flush(&mut self, request_id: &str) -> Result<(), TransportFailure>;

    /// Write a telemetry message associated with the given request.
    fn write_telemetry(&mut self, body: &[u8], request_id: &str) -> Result<(), TransportFailure>;
}

/// Creates [`Transport`] instances for new connections.
pub trait TransportFactory: Send + Sync {
    fn create(
        &self,
        url: &str,
        headers: &Headers,
        connection_id: &str,
    ) -> Result<Box<dyn Transport>, TransportFailure>;

    /// The platform's DNS cache, when one should be attached to new
    /// transports.
    fn dns_cache(&self) -> Option<Arc<dyn DnsCache>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_insert_and_get() {
        let mut headers = Headers::new();
        headers.insert("Path", "speech.phrase");
        assert_eq!(headers.get("Path"), Some("speech.phrase"));
        assert_eq!(headers.get("path"), Some("speech.phrase"));
        assert_eq!(headers.get("PATH"), Some("speech.phrase"));
        assert_eq!(headers.get("X-RequestId"), None);
    }

    #[test]
    fn test_headers_insert_replaces() {
        let mut headers = Headers::new();
        headers.insert("Authorization", "Bearer a");
        headers.insert("authorization", "Bearer b");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Authorization"), Some("Bearer b"));
    }

    #[test]
    fn test_headers_from_iter() {
        let headers: Headers =
            [("Path", "turn.end"), ("X-RequestId", "abc")].into_iter().collect();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("x-requestid"), Some("abc"));
    }
}
