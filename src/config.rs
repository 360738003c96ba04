//! Client configuration for a USP connection.
//!
//! A [`Client`] collects everything a connection needs before it is
//! established: the service profile (endpoint kind, recognition mode,
//! output format, regions, languages), the authentication credential, the
//! application's [`EventHandler`], and the [`TransportFactory`] that
//! supplies the WebSocket transport. The configuration is immutable once
//! [`Connection::connect`](crate::connection::Connection::connect) has
//! consumed it.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::UspError;
use crate::events::EventHandler;
use crate::transport::TransportFactory;

/// Service profile selecting the URL assembly rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointKind {
    /// Unified speech recognition.
    #[default]
    Speech,
    /// Speech translation.
    Translation,
    /// Intent recognition (LUIS).
    Intent,
    /// The Cortana device SDK endpoint.
    CdSdk,
    /// A caller-supplied endpoint URL.
    CustomEndpoint,
}

/// Recognition mode. Influences the URL path for [`EndpointKind::Speech`]
/// only; Intent always connects in interactive mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecognitionMode {
    /// Single short utterance.
    #[default]
    Interactive,
    /// Long-form multi-utterance conversation.
    Conversation,
    /// Dictation with explicit end-of-dictation handling.
    Dictation,
}

impl RecognitionMode {
    /// The URL path segment for this mode.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Conversation => "conversation",
            Self::Dictation => "dictation",
        }
    }
}

/// Result detail level. Controls whether phrase results carry
/// `DisplayText` or the `NBest` alternatives list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Simple,
    Detailed,
}

impl OutputFormat {
    /// The query parameter value for this format.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Detailed => "detailed",
        }
    }
}

/// Authentication credential, selecting the handshake header it travels in.
#[derive(Debug, Clone)]
pub enum Authentication {
    /// `Ocp-Apim-Subscription-Key: <key>`
    SubscriptionKey(String),
    /// `Authorization: Bearer <token>`
    AuthorizationToken(String),
    /// `X-Search-DelegationRPSToken: <token>`
    SearchDelegationRpsToken(String),
}

impl Authentication {
    pub(crate) fn secret(&self) -> &str {
        match self {
            Self::SubscriptionKey(s)
            | Self::AuthorizationToken(s)
            | Self::SearchDelegationRpsToken(s) => s,
        }
    }
}

/// Configuration for one USP connection.
///
/// Built with the `with_*` methods and handed to
/// [`Connection::connect`](crate::connection::Connection::connect).
#[derive(Clone, Default)]
pub struct Client {
    pub(crate) endpoint: EndpointKind,
    pub(crate) reco_mode: RecognitionMode,
    pub(crate) output_format: OutputFormat,
    pub(crate) region: String,
    pub(crate) intent_region: String,
    pub(crate) language: String,
    pub(crate) model_id: Option<String>,
    pub(crate) custom_endpoint_url: Option<String>,
    pub(crate) translation_source_language: String,
    pub(crate) translation_target_languages: String,
    pub(crate) translation_voice: Option<String>,
    pub(crate) auth: Option<Authentication>,
    pub(crate) connection_id: Option<Uuid>,
    pub(crate) handler: Option<Arc<dyn EventHandler>>,
    pub(crate) transport_factory: Option<Arc<dyn TransportFactory>>,
}

impl Client {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, endpoint: EndpointKind) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_recognition_mode(mut self, mode: RecognitionMode) -> Self {
        self.reco_mode = mode;
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Service region, e.g. `westus`. Used by the Speech and Translation
    /// profiles.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Region of the intent (LUIS) deployment. Used by the Intent profile
    /// only.
    pub fn with_intent_region(mut self, region: impl Into<String>) -> Self {
        self.intent_region = region.into();
        self
    }

    /// Recognition language, e.g. `en-US`.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Custom deployment (model) id. When set, it replaces the language
    /// parameter on Speech URLs.
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    /// Full endpoint URL overriding the profile-based assembly. Query
    /// parameters already present in it are not appended a second time.
    pub fn with_custom_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.custom_endpoint_url = Some(url.into());
        self
    }

    /// Translation source language, e.g. `en`.
    pub fn with_translation_source_language(mut self, language: impl Into<String>) -> Self {
        self.translation_source_language = language.into();
        self
    }

    /// Comma-separated translation target languages, e.g. `de,fr,es`.
    pub fn with_translation_target_languages(mut self, languages: impl Into<String>) -> Self {
        self.translation_target_languages = languages.into();
        self
    }

    /// Synthesis voice for translation. Setting one also requests the
    /// text-to-speech feature on the connection URL.
    pub fn with_translation_voice(mut self, voice: impl Into<String>) -> Self {
        self.translation_voice = Some(voice.into());
        self
    }

    pub fn with_authentication(mut self, auth: Authentication) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Connection id sent to the service for log correlation. Generated
    /// when not supplied.
    pub fn with_connection_id(mut self, id: Uuid) -> Self {
        self.connection_id = Some(id);
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transport_factory = Some(factory);
        self
    }

    /// Check the configuration before any connect work starts.
    pub fn validate(&self) -> Result<(), UspError> {
        match &self.auth {
            None => {
                return Err(UspError::InvalidArgument(
                    "No valid authentication mechanism was specified.".to_string(),
                ))
            }
            Some(auth) if auth.secret().is_empty() => {
                return Err(UspError::InvalidArgument(
                    "No valid authentication mechanism was specified.".to_string(),
                ))
            }
            Some(_) => {}
        }
        if self.handler.is_none() {
            return Err(UspError::InvalidArgument(
                "No event handler was provided.".to_string(),
            ));
        }
        if self.transport_factory.is_none() {
            return Err(UspError::InvalidArgument(
                "No transport factory was provided.".to_string(),
            ));
        }
        Ok(())
    }
}
