//! ISE provider configuration.
//!
//! Credentials, endpoint and the tunables of the streaming protocol. One
//! `IseConfig` is shared (by clone) across sessions; nothing in it is mutated
//! after construction.

use std::time::Duration;

use url::Url;
use zeroize::Zeroize;

use super::types::{AssessmentError, AssessmentResult, Language};

// =============================================================================
// Constants
// =============================================================================

/// Public ISE WebSocket endpoint.
pub const ISE_DEFAULT_ENDPOINT: &str = "wss://ise-api.xfyun.cn/v2/open-ise";

/// Default session deadline.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(60);

/// Bytes of PCM per audio frame (40ms at 16kHz/16-bit).
pub const DEFAULT_FRAME_BYTES: usize = 1280;

/// Outbound frames allowed to queue ahead of the socket.
pub const DEFAULT_SEND_QUEUE_FRAMES: usize = 32;

/// Longest clip the provider accepts for the chapter category.
pub const DEFAULT_CHAPTER_CEILING: Duration = Duration::from_secs(90);

/// PCM sample rate required by the provider.
pub const SAMPLE_RATE: u32 = 16_000;

/// PCM bytes per second of audio (mono, 16-bit).
pub const PCM_BYTES_PER_SECOND: usize = SAMPLE_RATE as usize * 2;

// =============================================================================
// IseConfig
// =============================================================================

/// Configuration for talking to the ISE provider.
#[derive(Clone)]
pub struct IseConfig {
    /// Application id issued by the provider.
    pub app_id: String,
    /// API key, sent inside the signed authorization header.
    pub api_key: String,
    /// Shared secret used for HMAC signing. Never logged.
    pub api_secret: String,
    /// WebSocket endpoint (`wss://host/path`).
    pub endpoint: String,
    /// Default language when a request does not name one.
    pub language: Language,
    /// Deadline for one complete session.
    pub session_timeout: Duration,
    /// PCM bytes per audio frame.
    pub frame_bytes: usize,
    /// Capacity of the outbound frame queue.
    pub send_queue_frames: usize,
    /// Chapter-category duration ceiling.
    pub chapter_ceiling: Duration,
}

impl Default for IseConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            endpoint: ISE_DEFAULT_ENDPOINT.to_string(),
            language: Language::default(),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            frame_bytes: DEFAULT_FRAME_BYTES,
            send_queue_frames: DEFAULT_SEND_QUEUE_FRAMES,
            chapter_ceiling: DEFAULT_CHAPTER_CEILING,
        }
    }
}

impl std::fmt::Debug for IseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IseConfig")
            .field("app_id", &self.app_id)
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("language", &self.language)
            .field("session_timeout", &self.session_timeout)
            .field("frame_bytes", &self.frame_bytes)
            .field("send_queue_frames", &self.send_queue_frames)
            .field("chapter_ceiling", &self.chapter_ceiling)
            .finish()
    }
}

impl Drop for IseConfig {
    fn drop(&mut self) {
        self.api_key.zeroize();
        self.api_secret.zeroize();
    }
}

impl IseConfig {
    /// Create a configuration with the given credentials and defaults elsewhere.
    pub fn new(
        app_id: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        let mut config = Self::default();
        config.app_id = app_id.into();
        config.api_key = api_key.into();
        config.api_secret = api_secret.into();
        config
    }

    /// Override the endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Override the session deadline.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Override the chapter ceiling.
    pub fn with_chapter_ceiling(mut self, ceiling: Duration) -> Self {
        self.chapter_ceiling = ceiling;
        self
    }

    /// Chapter ceiling expressed in PCM bytes (always a whole number of samples).
    pub fn chapter_ceiling_bytes(&self) -> usize {
        let bytes = (self.chapter_ceiling.as_secs_f64() * PCM_BYTES_PER_SECOND as f64) as usize;
        bytes & !1
    }

    /// Parse and check the endpoint URL.
    pub fn endpoint_url(&self) -> AssessmentResult<Url> {
        let url = Url::parse(&self.endpoint).map_err(|e| {
            AssessmentError::ConfigurationError(format!(
                "Invalid ISE endpoint '{}': {e}",
                self.endpoint
            ))
        })?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(AssessmentError::ConfigurationError(format!(
                    "ISE endpoint must use ws:// or wss://, got {other}://"
                )));
            }
        }

        if url.host_str().is_none() {
            return Err(AssessmentError::ConfigurationError(
                "ISE endpoint has no host".to_string(),
            ));
        }

        Ok(url)
    }

    /// Check that the configuration can be used to open sessions.
    pub fn validate(&self) -> AssessmentResult<()> {
        if self.app_id.is_empty() {
            return Err(AssessmentError::ConfigurationError(
                "ISE app_id is required".to_string(),
            ));
        }
        if self.api_key.is_empty() || self.api_secret.is_empty() {
            return Err(AssessmentError::ConfigurationError(
                "ISE api_key and api_secret are required".to_string(),
            ));
        }
        if self.frame_bytes == 0 || self.frame_bytes % 2 != 0 {
            return Err(AssessmentError::ConfigurationError(format!(
                "frame_bytes must be a positive even number, got {}",
                self.frame_bytes
            )));
        }
        if self.send_queue_frames == 0 {
            return Err(AssessmentError::ConfigurationError(
                "send_queue_frames must be at least 1".to_string(),
            ));
        }
        if self.session_timeout.is_zero() {
            return Err(AssessmentError::ConfigurationError(
                "session_timeout must be greater than zero".to_string(),
            ));
        }
        if self.chapter_ceiling_bytes() == 0 {
            return Err(AssessmentError::ConfigurationError(
                "chapter_ceiling must be greater than zero".to_string(),
            ));
        }
        self.endpoint_url().map(|_| ())
    }
}
