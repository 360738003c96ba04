//! The connection façade, worker pump, and outbound send API.
//!
//! A [`Connection`] owns one USP session: it assembles the URL and
//! handshake headers, creates the transport through the configured
//! factory, and spawns the background worker that drives transport I/O
//! and dispatches inbound events.
//!
//! # Threading
//!
//! All connection state lives behind one `parking_lot::Mutex`. Send
//! operations lock it, hand bytes to the transport, and wake the worker.
//! The worker locks it around [`Transport::do_work`], then drains the
//! inbound mailbox with the lock released around every user callback — so
//! callbacks are serialized per connection, never run under the lock, and
//! may call back into the send API.
//!
//! The worker holds only a [`Weak`] reference: dropping the façade lets
//! the worker observe the decay and exit on its next wake, at most one
//! wait period later.
//!
//! The connection is terminal by design: a transport error or
//! [`Connection::shutdown`] moves it to [`Phase::Terminated`] and there is
//! no way back. Reconnection policy belongs to the caller, who builds a
//! new connection.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::build_connection_headers;
use crate::config::Client;
use crate::dispatch::Inbound;
use crate::endpoint::build_connection_url;
use crate::error::{ErrorKind, UspError};
use crate::events::EventHandler;
use crate::messages::{path, MessageKind};
use crate::telemetry::Telemetry;
use crate::transport::{Headers, Transport, TransportErrorInfo, TransportEvents};

/// Upper bound on one worker wait; the pump re-checks its exit condition
/// at least this often even without a wake.
const WORKER_WAIT: Duration = Duration::from_millis(200);

/// One-way connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Connecting,
    Connected,
    Terminated,
}

/// Generates request ids and tracks which are live.
///
/// The active set is the authoritative filter for inbound frames; the
/// speech request id (empty string encodes "none") names the turn the
/// audio stream belongs to and is always a member of the active set.
#[derive(Default)]
pub(crate) struct RequestRegistry {
    active: HashSet<String>,
    speech: String,
}

impl RequestRegistry {
    /// Generate, register, and return a fresh request id.
    pub(crate) fn create(&mut self, telemetry: &Telemetry) -> String {
        let request_id = Uuid::new_v4().simple().to_string();
        info!(request_id = %request_id, "created request id");
        telemetry.record_request(&request_id);
        self.active.insert(request_id.clone());
        request_id
    }

    pub(crate) fn is_active(&self, request_id: &str) -> bool {
        self.active.contains(request_id)
    }

    pub(crate) fn speech_request_id(&self) -> Option<&str> {
        if self.speech.is_empty() {
            None
        } else {
            Some(&self.speech)
        }
    }

    pub(crate) fn set_speech(&mut self, request_id: String) {
        self.speech = request_id;
    }

    pub(crate) fn has_speech_turn(&self) -> bool {
        !self.speech.is_empty()
    }

    /// Detach a finished turn: drop the id from the active set and clear
    /// the speech request id when it named this turn.
    pub(crate) fn complete(&mut self, request_id: &str) {
        if self.speech == request_id {
            self.speech.clear();
        }
        self.active.remove(request_id);
    }
}

pub(crate) struct State {
    pub(crate) phase: Phase,
    pub(crate) transport: Option<Box<dyn Transport>>,
    pub(crate) audio_offset: u64,
    pub(crate) registry: RequestRegistry,
    pub(crate) handler: Option<Arc<dyn EventHandler>>,
}

pub(crate) struct ConnectionInner {
    pub(crate) state: Mutex<State>,
    pub(crate) cv: Condvar,
    pub(crate) have_work: AtomicBool,
    pub(crate) mailbox: Mutex<VecDeque<Inbound>>,
    pub(crate) telemetry: Telemetry,
    pub(crate) connection_id: String,
}

impl ConnectionInner {
    pub(crate) fn elapsed_ms(&self) -> u64 {
        self.telemetry.elapsed_ms()
    }

    /// Wake the worker for queued outbound work or mailbox traffic.
    pub(crate) fn signal_work(&self) {
        self.have_work.store(true, Ordering::Release);
        self.cv.notify_one();
    }

    fn signal_connected(&self) {
        let mut state = self.state.lock();
        if state.phase == Phase::Connecting {
            state.phase = Phase::Connected;
        }
        self.cv.notify_all();
    }

    /// Terminal transition; idempotent.
    pub(crate) fn terminate(&self) {
        let mut state = self.state.lock();
        state.phase = Phase::Terminated;
        drop(state);
        self.cv.notify_all();
    }

    /// Create the transport and wire it up. Split from `connect` so the
    /// guard against a second establishment is explicit.
    fn establish(this: &Arc<Self>, client: &Client) -> Result<(), UspError> {
        let mut state = this.state.lock();
        if state.transport.is_some() || state.phase == Phase::Connected {
            return Err(UspError::LogicError("USP connection already created.".to_string()));
        }

        let headers = build_connection_headers(client)?;
        let url = build_connection_url(client)?;
        info!(url = %url, connection_id = %this.connection_id, "connecting");

        this.telemetry
            .device_startup(&Uuid::new_v4().simple().to_string());

        let factory = client.transport_factory.as_ref().ok_or_else(|| {
            UspError::InvalidArgument("No transport factory was provided.".to_string())
        })?;
        let mut transport = factory
            .create(&url, &headers, &this.connection_id)
            .map_err(|e| UspError::RuntimeError(format!("Failed to create transport request. {e}")))?;
        if let Some(cache) = factory.dns_cache() {
            transport.set_dns_cache(cache);
        }
        transport.set_event_sink(Arc::new(MailboxSink {
            inner: Arc::downgrade(this),
        }));

        state.transport = Some(transport);
        Ok(())
    }
}

/// The transport's view of the connection: enqueue and wake, nothing more.
/// Holds a weak reference so a transport outliving the façade cannot keep
/// it alive.
struct MailboxSink {
    inner: Weak<ConnectionInner>,
}

impl TransportEvents for MailboxSink {
    fn on_data(&self, headers: Headers, body: Bytes, error_code: u32) {
        if let Some(inner) = self.inner.upgrade() {
            inner.mailbox.lock().push_back(Inbound::Data {
                headers,
                body,
                error_code,
            });
            inner.signal_work();
        }
    }

    fn on_error(&self, error: TransportErrorInfo) {
        if let Some(inner) = self.inner.upgrade() {
            inner.mailbox.lock().push_back(Inbound::Error(error));
            inner.signal_work();
        }
    }
}

fn worker_loop(ptr: Weak<ConnectionInner>) {
    match ptr.upgrade() {
        Some(inner) => inner.signal_connected(),
        None => return,
    }

    loop {
        let inner = match ptr.upgrade() {
            Some(inner) => inner,
            None => {
                info!("connection destroyed, worker exiting");
                return;
            }
        };

        {
            let mut state = inner.state.lock();
            if state.phase != Phase::Connected {
                break;
            }
            let result = match state.transport.as_mut() {
                Some(transport) => transport.do_work(),
                None => Ok(()),
            };
            drop(state);
            if let Err(e) = result {
                inner.deliver_error(false, ErrorKind::RuntimeError, &e.to_string());
            }
        }

        inner.drain_mailbox();

        let mut state = inner.state.lock();
        if !inner.have_work.load(Ordering::Acquire) && state.phase == Phase::Connected {
            let _ = inner.cv.wait_for(&mut state, WORKER_WAIT);
        }
        inner.have_work.store(false, Ordering::Release);
    }

    info!("worker ending normally");
}

/// One live USP session.
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("connection_id", &self.inner.connection_id)
            .finish()
    }
}

impl Connection {
    /// Establish a connection from the given configuration.
    ///
    /// Blocks until the background worker is running. Transport-level
    /// failures after this point (including a failed WebSocket upgrade)
    /// arrive through [`EventHandler::on_error`].
    pub fn connect(client: Client) -> Result<Self, UspError> {
        client.validate()?;

        let connection_id = client
            .connection_id
            .unwrap_or_else(Uuid::new_v4)
            .simple()
            .to_string();

        let inner = Arc::new(ConnectionInner {
            state: Mutex::new(State {
                phase: Phase::Connecting,
                transport: None,
                audio_offset: 0,
                registry: RequestRegistry::default(),
                handler: client.handler.clone(),
            }),
            cv: Condvar::new(),
            have_work: AtomicBool::new(false),
            mailbox: Mutex::new(VecDeque::new()),
            telemetry: Telemetry::new(connection_id.clone()),
            connection_id,
        });

        ConnectionInner::establish(&inner, &client)?;

        // The worker is detached by dropping its handle; shutdown never
        // joins it.
        let weak = Arc::downgrade(&inner);
        thread::Builder::new()
            .name("unispeech-worker".to_string())
            .spawn(move || worker_loop(weak))
            .map_err(|e| {
                UspError::RuntimeError(format!("Failed to start the connection worker. {e}"))
            })?;

        let mut state = inner.state.lock();
        while state.phase == Phase::Connecting {
            inner.cv.wait(&mut state);
        }
        drop(state);

        Ok(Self { inner })
    }

    /// Whether the connection is still live.
    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().phase == Phase::Connected
    }

    /// Queue a protocol message.
    ///
    /// Silently dropped when the connection is no longer live. A
    /// [`MessageKind::Context`] message opens a turn and is rejected with
    /// [`UspError::LogicError`] while one is already in progress; every
    /// kind except [`MessageKind::Config`] is assigned a fresh request id.
    pub fn queue_message(&self, path: &str, body: &[u8], kind: MessageKind) -> Result<(), UspError> {
        let inner = &self.inner;
        let mut state = inner.state.lock();

        if path.is_empty() {
            return Err(UspError::InvalidArgument("The path is null or empty.".to_string()));
        }

        if state.phase == Phase::Connected {
            // The service closes the connection when it sees a second
            // context message inside one turn.
            if kind == MessageKind::Context && state.registry.has_speech_turn() {
                return Err(UspError::LogicError(
                    "Error trying to send a context message while in the middle of a speech turn."
                        .to_string(),
                ));
            }

            let request_id = if kind == MessageKind::Config {
                None
            } else {
                let request_id = state.registry.create(&inner.telemetry);
                if kind == MessageKind::Context {
                    state.registry.set_speech(request_id.clone());
                }
                Some(request_id)
            };

            if let Some(transport) = state.transport.as_mut() {
                let _ = transport.message_write(path, body, request_id.as_deref());
            }
        }

        drop(state);
        inner.signal_work();
        Ok(())
    }

    /// Queue one audio chunk.
    ///
    /// An empty chunk is equivalent to [`Connection::queue_audio_end`].
    /// The first chunk of a turn adopts the current speech request id
    /// (creating one when no context message opened the turn) and
    /// prepares the audio stream.
    pub fn queue_audio_segment(&self, data: &[u8]) -> Result<(), UspError> {
        if data.is_empty() {
            return self.queue_audio_end();
        }

        let inner = &self.inner;
        let mut state = inner.state.lock();
        debug!(ts = inner.elapsed_ms(), size = data.len(), "writing audio data");

        if state.phase != Phase::Connected {
            return Ok(());
        }

        inner.telemetry.record_audio_bytes(data.len() as u64);

        if state.audio_offset == 0 {
            // The first audio chunk carrying a fresh request id is what
            // delimits a turn for the service; it discards anything still
            // queued under earlier ids.
            let request_id = if state.registry.has_speech_turn() {
                state
                    .registry
                    .speech_request_id()
                    .unwrap_or_default()
                    .to_string()
            } else {
                let id = state.registry.create(&inner.telemetry);
                state.registry.set_speech(id.clone());
                id
            };
            inner.telemetry.record_audio_start(&request_id);
            if let Some(transport) = state.transport.as_mut() {
                transport.stream_prepare(path::AUDIO_STREAM).map_err(|e| {
                    UspError::RuntimeError(format!("TransportStreamPrepare failed. error={e}"))
                })?;
            }
        }

        let request_id = state
            .registry
            .speech_request_id()
            .unwrap_or_default()
            .to_string();
        if let Some(transport) = state.transport.as_mut() {
            transport.stream_write(data, &request_id).map_err(|e| {
                UspError::RuntimeError(format!("TransportStreamWrite failed. error={e}"))
            })?;
        }

        state.audio_offset += data.len() as u64;
        drop(state);
        inner.signal_work();
        Ok(())
    }

    /// Flush and close the audio stream of the current turn. A no-op when
    /// not connected or no audio was written.
    pub fn queue_audio_end(&self) -> Result<(), UspError> {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        debug!(ts = inner.elapsed_ms(), "flushing audio stream");

        if state.phase != Phase::Connected || state.audio_offset == 0 {
            return Ok(());
        }

        let request_id = state
            .registry
            .speech_request_id()
            .unwrap_or_default()
            .to_string();
        let result = match state.transport.as_mut() {
            Some(transport) => transport.stream_flush(&request_id),
            None => Ok(()),
        };

        state.audio_offset = 0;
        inner.telemetry.record_audio_end(&request_id);

        result.map_err(|e| UspError::RuntimeError(format!("TransportStreamFlush failed. error={e}")))?;

        drop(state);
        inner.signal_work();
        Ok(())
    }

    /// Shut the connection down.
    ///
    /// Clears the callback set, moves to the terminal phase, and wakes
    /// the worker so it can exit. Never blocks and never joins the
    /// worker; late transport events are tolerated and go nowhere.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        state.handler = None;
        state.phase = Phase::Terminated;
        drop(state);
        self.inner.signal_work();
        info!(connection_id = %self.inner.connection_id, "connection shut down");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown();
    }
}
