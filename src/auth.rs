//! Handshake header construction.
//!
//! Produces the HTTP headers sent with the WebSocket upgrade: the
//! authentication header selected by the configured credential kind, plus
//! the audio-format and user-agent headers the CD-SDK profile requires.

use crate::config::{Authentication, Client, EndpointKind};
use crate::error::UspError;
use crate::transport::{headers, Headers};

pub(crate) const USER_AGENT: &str = concat!("unispeech/", env!("CARGO_PKG_VERSION"));

const CD_SDK_AUDIO_FORMAT: &str = "riff-16khz-16bit-mono-pcm";

/// Build the connection headers for the configured client.
///
/// Assumes [`Client::validate`] has already accepted the configuration;
/// a missing credential still fails here rather than producing an
/// unauthenticated handshake.
pub(crate) fn build_connection_headers(client: &Client) -> Result<Headers, UspError> {
    let mut map = Headers::new();

    if client.endpoint == EndpointKind::CdSdk {
        map.insert(headers::OUTPUT_AUDIO_CODEC, CD_SDK_AUDIO_FORMAT);
        map.insert(headers::USER_AGENT, USER_AGENT);
    }

    match &client.auth {
        Some(Authentication::SubscriptionKey(key)) => {
            map.insert(headers::OCP_APIM_SUBSCRIPTION_KEY, key.as_str());
        }
        Some(Authentication::AuthorizationToken(token)) => {
            map.insert(headers::AUTHORIZATION, format!("Bearer {token}"));
        }
        Some(Authentication::SearchDelegationRpsToken(token)) => {
            map.insert(headers::SEARCH_DELEGATION_RPS_TOKEN, token.as_str());
        }
        None => {
            return Err(UspError::InvalidArgument(
                "No valid authentication mechanism was specified.".to_string(),
            ));
        }
    }

    Ok(map)
}
