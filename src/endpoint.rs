//! Connection URL assembly.
//!
//! A pure function over the client configuration: no I/O, no state. Hosts
//! and paths are taken as supplied; only the individual `from`, `to` and
//! `voice` query values are URL-encoded, a documented limitation carried
//! over from the service contract.

use url::form_urlencoded;

use crate::config::{Client, EndpointKind, RecognitionMode};
use crate::error::UspError;

const PROTOCOL: &str = "wss://";

mod unified_speech {
    pub const HOSTNAME_SUFFIX: &str = ".stt.speech.microsoft.com";
    pub const PATH_PREFIX: &str = "/speech/recognition/";
    pub const PATH_SUFFIX: &str = "/cognitiveservices/v1";

    pub const OUTPUT_FORMAT_PARAM: &str = "format=";
    pub const LANG_PARAM: &str = "language=";
    pub const DEPLOYMENT_ID_PARAM: &str = "cid=";
}

mod translation {
    pub const HOSTNAME_SUFFIX: &str = ".s2s.speech.microsoft.com";
    pub const PATH: &str = "/speech/translation/cognitiveservices/v1";

    pub const FROM_PARAM: &str = "from=";
    pub const TO_PARAM: &str = "to=";
    pub const VOICE_PARAM: &str = "voice=";
    pub const FEATURES_PARAM: &str = "features=";
    pub const REQUIRE_VOICE: &str = "texttospeech";
}

mod luis {
    pub const HOSTNAME: &str = "speech.platform.bing.com";
    pub const PATH_PREFIX1: &str = "/speech/";
    pub const PATH_PREFIX2: &str = "/recognition/";
    pub const PATH_SUFFIX: &str = "/cognitiveservices/v1";
}

mod cd_sdk {
    pub const URL: &str = "speech.platform.bing.com/cortana/api/v1?environment=Home&language=en-US";
}

fn encode_query_value(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Assemble the connection URL for the configured service profile.
///
/// A configured custom endpoint URL is used as-is; query parameters the
/// profile would add are appended only when not already present in it.
/// The result contains at most one `?`; every later parameter is
/// introduced by `&`.
pub(crate) fn build_connection_url(client: &Client) -> Result<String, UspError> {
    let mut url = String::new();

    let custom = match &client.custom_endpoint_url {
        Some(u) if !u.is_empty() => {
            url.push_str(u);
            true
        }
        _ => false,
    };

    if !custom {
        url.push_str(PROTOCOL);
        match client.endpoint {
            EndpointKind::Speech => {
                url.push_str(&client.region);
                url.push_str(unified_speech::HOSTNAME_SUFFIX);
                url.push_str(unified_speech::PATH_PREFIX);
                url.push_str(client.reco_mode.as_str());
                url.push_str(unified_speech::PATH_SUFFIX);
            }
            EndpointKind::Translation => {
                url.push_str(&client.region);
                url.push_str(translation::HOSTNAME_SUFFIX);
                url.push_str(translation::PATH);
            }
            EndpointKind::Intent => {
                url.push_str(luis::HOSTNAME);
                url.push_str(luis::PATH_PREFIX1);
                url.push_str(&client.intent_region);
                url.push_str(luis::PATH_PREFIX2);
                // Intent always connects interactive, whatever the
                // configured mode.
                url.push_str(RecognitionMode::Interactive.as_str());
                url.push_str(luis::PATH_SUFFIX);
            }
            EndpointKind::CdSdk => {
                url.push_str(cd_sdk::URL);
            }
            EndpointKind::CustomEndpoint => {
                return Err(UspError::InvalidArgument("Unknown endpoint type.".to_string()));
            }
        }
    }

    // The output format is the first appended parameter.
    if !custom || !url.contains(unified_speech::OUTPUT_FORMAT_PARAM) {
        let delim = if url.contains('?') { '&' } else { '?' };
        url.push(delim);
        url.push_str(unified_speech::OUTPUT_FORMAT_PARAM);
        url.push_str(client.output_format.as_str());
    }

    match client.endpoint {
        EndpointKind::Speech => {
            if let Some(model_id) = nonempty(&client.model_id) {
                if !custom || !url.contains(unified_speech::DEPLOYMENT_ID_PARAM) {
                    url.push('&');
                    url.push_str(unified_speech::DEPLOYMENT_ID_PARAM);
                    url.push_str(model_id);
                }
            } else if !client.language.is_empty()
                && (!custom || !url.contains(unified_speech::LANG_PARAM))
            {
                url.push('&');
                url.push_str(unified_speech::LANG_PARAM);
                url.push_str(&client.language);
            }
        }
        EndpointKind::Intent => {
            if !client.language.is_empty()
                && (!custom || !url.contains(unified_speech::LANG_PARAM))
            {
                url.push('&');
                url.push_str(unified_speech::LANG_PARAM);
                url.push_str(&client.language);
            }
        }
        EndpointKind::Translation => {
            if !custom || !url.contains(translation::FROM_PARAM) {
                url.push('&');
                url.push_str(translation::FROM_PARAM);
                url.push_str(&encode_query_value(&client.translation_source_language));
            }
            if !custom || !url.contains(translation::TO_PARAM) {
                // A trailing separator yields one final empty `to=`.
                for target in client.translation_target_languages.split(',') {
                    url.push('&');
                    url.push_str(translation::TO_PARAM);
                    url.push_str(&encode_query_value(target));
                }
            }
            if let Some(voice) = nonempty(&client.translation_voice) {
                if !custom || !url.contains(translation::VOICE_PARAM) {
                    url.push('&');
                    url.push_str(translation::FEATURES_PARAM);
                    url.push_str(translation::REQUIRE_VOICE);
                    url.push('&');
                    url.push_str(translation::VOICE_PARAM);
                    url.push_str(&encode_query_value(voice));
                }
            }
        }
        EndpointKind::CdSdk | EndpointKind::CustomEndpoint => {}
    }

    Ok(url)
}

fn nonempty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
