//! Configuration module for the ISE gateway
//!
//! This module handles server configuration from .env files, YAML files and
//! environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//!
//! # Example
//! ```rust,no_run
//! use ise_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use zeroize::Zeroize;

use crate::core::assessment::{AssessmentError, AssessmentResult, IseConfig, Language};

mod env;
mod merge;
mod yaml;

/// Default multipart body limit (20 MiB, a little over ten minutes of PCM).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Server configuration
///
/// Contains:
/// - Listener settings
/// - ISE credentials and protocol tunables
/// - Security settings (CORS, upload limit)
#[derive(Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // ISE provider
    pub ise_app_id: Option<String>,
    pub ise_api_key: Option<String>,
    pub ise_api_secret: Option<String>,
    pub ise_endpoint: String,
    /// Language used when a request does not name one
    pub ise_language: Language,
    pub ise_session_timeout_secs: u64,
    pub ise_frame_bytes: usize,
    pub ise_send_queue_frames: usize,
    /// Chapter clips longer than this are split
    pub ise_chapter_ceiling_secs: u64,

    // Security settings
    pub max_upload_bytes: usize,
    /// Comma-separated allowed origins, or "*"
    pub cors_allowed_origins: Option<String>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("ise_app_id", &self.ise_app_id)
            .field("ise_api_key", &self.ise_api_key.as_ref().map(|_| "<redacted>"))
            .field(
                "ise_api_secret",
                &self.ise_api_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("ise_endpoint", &self.ise_endpoint)
            .field("ise_language", &self.ise_language)
            .field("ise_session_timeout_secs", &self.ise_session_timeout_secs)
            .field("ise_frame_bytes", &self.ise_frame_bytes)
            .field("ise_send_queue_frames", &self.ise_send_queue_frames)
            .field("ise_chapter_ceiling_secs", &self.ise_chapter_ceiling_secs)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .finish()
    }
}

/// Zeroize the provider credentials when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        if let Some(ref mut key) = self.ise_api_key {
            key.zeroize();
        }
        if let Some(ref mut secret) = self.ise_api_secret {
            secret.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// The .env file is loaded in main.rs before this is called.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        config.validate()?;
        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Provider configuration derived from these settings.
    pub fn ise_config(&self) -> IseConfig {
        let mut config = IseConfig::new(
            self.ise_app_id.clone().unwrap_or_default(),
            self.ise_api_key.clone().unwrap_or_default(),
            self.ise_api_secret.clone().unwrap_or_default(),
        )
        .with_endpoint(self.ise_endpoint.clone())
        .with_session_timeout(Duration::from_secs(self.ise_session_timeout_secs))
        .with_chapter_ceiling(Duration::from_secs(self.ise_chapter_ceiling_secs));
        config.language = self.ise_language;
        config.frame_bytes = self.ise_frame_bytes;
        config.send_queue_frames = self.ise_send_queue_frames;
        config
    }

    /// Check credentials, sizes and the endpoint.
    pub fn validate(&self) -> AssessmentResult<()> {
        if self.max_upload_bytes == 0 {
            return Err(AssessmentError::ConfigurationError(
                "MAX_UPLOAD_BYTES must be greater than zero".to_string(),
            ));
        }
        self.ise_config().validate()
    }
}
