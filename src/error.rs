//! Error types for the USP connection core.
//!
//! Two layers of errors exist:
//!
//! - [`UspError`] is returned from the public API (`connect`, the `queue_*`
//!   send operations) when the caller misuses the connection or a transport
//!   operation fails synchronously.
//! - [`ErrorKind`] classifies errors surfaced asynchronously through
//!   [`EventHandler::on_error`](crate::events::EventHandler::on_error),
//!   together with a `recoverable` flag: transport-level failures are
//!   recoverable (the caller may reconnect), service-level recognition
//!   errors are not.

use thiserror::Error;

use crate::messages::RecognitionStatus;
use crate::transport::{TransportErrorInfo, TransportErrorReason};

/// Errors returned by the public connection API.
#[derive(Debug, Clone, Error)]
pub enum UspError {
    /// A caller-supplied argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not valid in the connection's current state.
    #[error("logic error: {0}")]
    LogicError(String),

    /// An internal or transport-level operation failed.
    #[error("runtime error: {0}")]
    RuntimeError(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, UspError>;

/// Classification of errors delivered through the error callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The connection to the service failed or was lost.
    ConnectionError,
    /// The service rejected the credentials (HTTP 401/403).
    AuthenticationError,
    /// The service rejected the request parameters (HTTP 400).
    BadRequest,
    /// The service throttled the request (HTTP 429).
    TooManyRequests,
    /// The subscription ran out of quota.
    Forbidden,
    /// The service is temporarily unavailable.
    ServiceUnavailable,
    /// The service reported an internal error or sent an invalid response.
    ServiceError,
    /// An unexpected failure inside the connection core.
    RuntimeError,
}

const HTTP_BAD_REQUEST: u32 = 400;
const HTTP_UNAUTHORIZED: u32 = 401;
const HTTP_FORBIDDEN: u32 = 403;
const HTTP_TOO_MANY_REQUESTS: u32 = 429;

/// Map a transport failure to the user-visible error classification.
///
/// Every transport failure is recoverable from the caller's point of view:
/// the connection itself is terminal afterwards, but a new one may be
/// created with the same configuration.
pub(crate) fn classify_transport_error(info: &TransportErrorInfo) -> (ErrorKind, String) {
    match info.reason {
        TransportErrorReason::RemoteClosed => (
            ErrorKind::ConnectionError,
            format!(
                "Connection was closed by the remote host. Error code: {}. Error details: {}",
                info.error_code, info.message
            ),
        ),
        TransportErrorReason::ConnectionFailure => (
            ErrorKind::ConnectionError,
            format!(
                "Connection failed (no connection to the remote host). Internal error: {}. \
                 Error details: {}. Please check network connection, firewall setting, and \
                 the region name used to create speech factory.",
                info.error_code, info.message
            ),
        ),
        TransportErrorReason::WebSocketUpgrade => match info.error_code {
            HTTP_BAD_REQUEST => (
                ErrorKind::BadRequest,
                "WebSocket Upgrade failed with a bad request (400). Please check the language \
                 name and endpoint id (if used) are correctly associated with the provided \
                 subscription key."
                    .to_string(),
            ),
            HTTP_UNAUTHORIZED => (
                ErrorKind::AuthenticationError,
                "WebSocket Upgrade failed with an authentication error (401). Please check \
                 for correct subscription key (or authorization token) and region name."
                    .to_string(),
            ),
            HTTP_FORBIDDEN => (
                ErrorKind::AuthenticationError,
                "WebSocket Upgrade failed with an authentication error (403). Please check \
                 for correct subscription key (or authorization token) and region name."
                    .to_string(),
            ),
            HTTP_TOO_MANY_REQUESTS => (
                ErrorKind::TooManyRequests,
                "WebSocket Upgrade failed with too many requests error (429). Please check \
                 for correct subscription key (or authorization token) and region name."
                    .to_string(),
            ),
            other => (
                ErrorKind::ConnectionError,
                format!("WebSocket Upgrade failed with HTTP status code: {other}"),
            ),
        },
        TransportErrorReason::WebSocketSendFrame => (
            ErrorKind::ConnectionError,
            format!(
                "Failure while sending a frame over the WebSocket connection. \
                 Internal error: {}. Error details: {}",
                info.error_code, info.message
            ),
        ),
        TransportErrorReason::WebSocketError => (
            ErrorKind::ConnectionError,
            format!(
                "WebSocket operation failed. Internal error: {}. Error details: {}",
                info.error_code, info.message
            ),
        ),
        TransportErrorReason::DnsFailure => (
            ErrorKind::ConnectionError,
            format!(
                "DNS connection failed (the remote host did not respond). Internal error: {}",
                info.error_code
            ),
        ),
        TransportErrorReason::Unknown => {
            (ErrorKind::ConnectionError, "Unknown transport error.".to_string())
        }
    }
}

/// Map a non-success recognition status to the user-visible error
/// classification. These are service-level outcomes and therefore
/// non-recoverable.
///
/// The benign statuses never belong here; routing one through anyway is
/// reported as a [`ErrorKind::RuntimeError`] so the mistake is visible
/// instead of silently mislabelled.
pub(crate) fn classify_recognition_error(
    status: RecognitionStatus,
    response: &str,
) -> (ErrorKind, String) {
    match status {
        RecognitionStatus::Error => (
            ErrorKind::ServiceError,
            format!(
                "The speech recognition service encountered an internal error and could not \
                 continue. Response text:{response}"
            ),
        ),
        RecognitionStatus::TooManyRequests => (
            ErrorKind::TooManyRequests,
            format!(
                "The number of parallel requests exceeded the number of allowed concurrent \
                 transcriptions. Response text:{response}"
            ),
        ),
        RecognitionStatus::BadRequest => (
            ErrorKind::BadRequest,
            format!("Invalid parameter or unsupported audio format in the request. Response text:{response}"),
        ),
        RecognitionStatus::Forbidden => (
            ErrorKind::Forbidden,
            format!(
                "The recognizer is using a free subscription that ran out of quota. \
                 Response text:{response}"
            ),
        ),
        RecognitionStatus::ServiceUnavailable => (
            ErrorKind::ServiceUnavailable,
            format!("The service is currently unavailable. Response text:{response}"),
        ),
        RecognitionStatus::InvalidMessage => (
            ErrorKind::ServiceError,
            format!("Invalid response. Response text:{response}"),
        ),
        RecognitionStatus::Success
        | RecognitionStatus::EndOfDictation
        | RecognitionStatus::InitialSilenceTimeout
        | RecognitionStatus::InitialBabbleTimeout
        | RecognitionStatus::NoMatch => (
            ErrorKind::RuntimeError,
            format!(
                "Runtime Error: invoke error callback for non-error recognition status. \
                 Response text:{response}"
            ),
        ),
    }
}
