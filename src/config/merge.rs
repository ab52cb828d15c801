//! Merging YAML overrides onto the environment configuration.

use super::ServerConfig;
use super::env;
use super::yaml::YamlConfig;
use crate::core::assessment::Language;

/// Environment (with defaults) as the base, YAML values on top.
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = env::load()?;

    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(max_upload_bytes) = server.max_upload_bytes {
            config.max_upload_bytes = max_upload_bytes;
        }
    }

    if let Some(ise) = yaml.ise {
        if ise.app_id.is_some() {
            config.ise_app_id = ise.app_id;
        }
        if ise.api_key.is_some() {
            config.ise_api_key = ise.api_key;
        }
        if ise.api_secret.is_some() {
            config.ise_api_secret = ise.api_secret;
        }
        if let Some(endpoint) = ise.endpoint {
            config.ise_endpoint = endpoint;
        }
        if let Some(language) = ise.language {
            config.ise_language = language.parse::<Language>()?;
        }
        if let Some(secs) = ise.session_timeout_secs {
            config.ise_session_timeout_secs = secs;
        }
        if let Some(frame_bytes) = ise.frame_bytes {
            config.ise_frame_bytes = frame_bytes;
        }
        if let Some(frames) = ise.send_queue_frames {
            config.ise_send_queue_frames = frames;
        }
        if let Some(secs) = ise.chapter_ceiling_secs {
            config.ise_chapter_ceiling_secs = secs;
        }
    }

    if let Some(security) = yaml.security
        && security.cors_allowed_origins.is_some()
    {
        config.cors_allowed_origins = security.cors_allowed_origins;
    }

    Ok(config)
}
