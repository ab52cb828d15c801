//! Environment variable loading.

use std::env;
use std::str::FromStr;

use crate::core::assessment::{
    DEFAULT_CHAPTER_CEILING, DEFAULT_FRAME_BYTES, DEFAULT_SEND_QUEUE_FRAMES,
    DEFAULT_SESSION_TIMEOUT, ISE_DEFAULT_ENDPOINT, Language,
};

use super::{DEFAULT_MAX_UPLOAD_BYTES, ServerConfig};

/// Non-empty, trimmed value of an environment variable.
pub(super) fn var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse an environment variable, falling back to `default` when unset.
pub(super) fn parse_var<T>(key: &str, default: T) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(value) => value
            .parse::<T>()
            .map_err(|e| format!("Invalid value for {key} ('{value}'): {e}")),
        None => Ok(default),
    }
}

/// Build a configuration from environment variables and defaults.
pub(super) fn load() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let language = match var("ISE_LANGUAGE") {
        Some(value) => value.parse::<Language>()?,
        None => Language::default(),
    };

    Ok(ServerConfig {
        host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
        port: parse_var("PORT", 3001)?,
        ise_app_id: var("ISE_APP_ID"),
        ise_api_key: var("ISE_API_KEY"),
        ise_api_secret: var("ISE_API_SECRET"),
        ise_endpoint: var("ISE_ENDPOINT").unwrap_or_else(|| ISE_DEFAULT_ENDPOINT.to_string()),
        ise_language: language,
        ise_session_timeout_secs: parse_var(
            "ISE_SESSION_TIMEOUT_SECS",
            DEFAULT_SESSION_TIMEOUT.as_secs(),
        )?,
        ise_frame_bytes: parse_var("ISE_FRAME_BYTES", DEFAULT_FRAME_BYTES)?,
        ise_send_queue_frames: parse_var("ISE_SEND_QUEUE_FRAMES", DEFAULT_SEND_QUEUE_FRAMES)?,
        ise_chapter_ceiling_secs: parse_var(
            "ISE_CHAPTER_CEILING_SECS",
            DEFAULT_CHAPTER_CEILING.as_secs(),
        )?,
        max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
        cors_allowed_origins: var("CORS_ALLOWED_ORIGINS"),
    })
}
