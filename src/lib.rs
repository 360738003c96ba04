//! Client-side Unified Speech Protocol (USP) connection core.
//!
//! A USP connection is a long-lived, full-duplex WebSocket session to a
//! cloud speech service: microphone audio streams up as a chunked binary
//! stream while a mixed stream of JSON control messages (recognition,
//! translation, turn lifecycle) and binary synthesis payloads comes back,
//! surfaced to the application as structured events.
//!
//! # Architecture
//!
//! ```text
//! caller ──▶ Connection ──▶ send API ──▶ Transport (collaborator)
//!                │                           │
//!                │          mailbox ◀── TransportEvents sink
//!                │             │
//!                └── worker ───┴──▶ dispatch ──▶ EventHandler callbacks
//! ```
//!
//! - [`config::Client`] collects the service profile, credential,
//!   callback set, and transport factory.
//! - [`connection::Connection`] owns the session: URL and header
//!   assembly, the per-turn request-id state machine, the outbound
//!   queue, and the background worker that drives transport I/O.
//! - [`transport`] defines the WebSocket collaborator contract; this
//!   crate implements no framing, TLS, or upgrade itself.
//! - [`messages`] decodes the inbound grammar; [`events`] is what the
//!   application sees.
//!
//! The connection is deliberately terminal: transport failures and
//! [`Connection::shutdown`](connection::Connection::shutdown) end it for
//! good, and reconnection policy belongs to the caller.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use unispeech::events::SpeechPhrase;
//! use unispeech::transport::{
//!     Headers, Transport, TransportEvents, TransportFactory, TransportFailure,
//! };
//! use unispeech::{
//!     Authentication, Client, Connection, EndpointKind, EventHandler, MessageKind,
//!     OutputFormat, RecognitionMode,
//! };
//!
//! struct Printer;
//!
//! impl EventHandler for Printer {
//!     fn on_speech_phrase(&self, event: SpeechPhrase) {
//!         println!("recognized: {}", event.display_text);
//!     }
//! }
//!
//! // The WebSocket transport is a collaborator; anything implementing
//! // `Transport` + `TransportFactory` plugs in here.
//! # struct MyTransport;
//! # impl Transport for MyTransport {
//! #     fn set_event_sink(&mut self, _sink: Arc<dyn TransportEvents>) {}
//! #     fn do_work(&mut self) -> Result<(), TransportFailure> { Ok(()) }
//! #     fn message_write(
//! #         &mut self,
//! #         _path: &str,
//! #         _body: &[u8],
//! #         _request_id: Option<&str>,
//! #     ) -> Result<(), TransportFailure> { Ok(()) }
//! #     fn stream_prepare(&mut self, _path: &str) -> Result<(), TransportFailure> { Ok(()) }
//! #     fn stream_write(&mut self, _body: &[u8], _request_id: &str) -> Result<(), TransportFailure> { Ok(()) }
//! #     fn stream_flush(&mut self, _request_id: &str) -> Result<(), TransportFailure> { Ok(()) }
//! #     fn write_telemetry(&mut self, _body: &[u8], _request_id: &str) -> Result<(), TransportFailure> { Ok(()) }
//! # }
//! # struct MyFactory;
//! # impl TransportFactory for MyFactory {
//! #     fn create(
//! #         &self,
//! #         _url: &str,
//! #         _headers: &Headers,
//! #         _connection_id: &str,
//! #     ) -> Result<Box<dyn Transport>, TransportFailure> { Ok(Box::new(MyTransport)) }
//! # }
//! fn main() -> Result<(), unispeech::UspError> {
//!     let client = Client::new()
//!         .with_endpoint(EndpointKind::Speech)
//!         .with_region("westus")
//!         .with_language("en-US")
//!         .with_recognition_mode(RecognitionMode::Interactive)
//!         .with_output_format(OutputFormat::Detailed)
//!         .with_authentication(Authentication::SubscriptionKey("<key>".to_string()))
//!         .with_event_handler(Arc::new(Printer))
//!         .with_transport_factory(Arc::new(MyFactory));
//!
//!     let connection = Connection::connect(client)?;
//!     connection.queue_message("speech.context", b"{}", MessageKind::Context)?;
//!     connection.queue_audio_segment(&[0u8; 3200])?;
//!     connection.queue_audio_end()?;
//!     connection.shutdown();
//!     Ok(())
//! }
//! ```

/// Log a protocol violation.
///
/// Violations — unknown request ids, missing required fields, unknown
/// status strings — are logged on a dedicated target and otherwise
/// ignored; they never become user-visible errors.
macro_rules! protocol_violation {
    ($($arg:tt)*) => {
        tracing::warn!(target: "unispeech::protocol", $($arg)*)
    };
}
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod messages;
pub mod transport;

mod auth;
mod dispatch;
mod endpoint;
mod telemetry;

pub use config::{Authentication, Client, EndpointKind, OutputFormat, RecognitionMode};
pub use connection::Connection;
pub use error::{ErrorKind, UspError};
pub use events::EventHandler;
pub use messages::{
    MessageKind, RecognitionStatus, ServiceMessage, SynthesisStatus, TranslationStatus,
};
pub use transport::{
    DnsCache, Headers, Transport, TransportErrorInfo, TransportErrorReason, TransportEvents,
    TransportFactory, TransportFailure,
};
