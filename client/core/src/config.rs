//! TOML Configuration File Support
//!
//! Centralized configuration loading for the chat client, supporting a TOML
//! file at `~/.config/pridox/client.toml`.
//!
//! # Configuration Priority
//!
//! Values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [api]
//! url = "https://pridox.example.com"
//! request_timeout_secs = 120
//! stream_channel_capacity = 64
//!
//! [chat]
//! default_max_document_tokens = 4096
//! document_token_reserve = 75
//! session_name_max_chars = 50
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::documents::DEFAULT_TOKEN_RESERVE;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// API section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiToml {
    /// Base URL of the chat backend
    pub url: Option<String>,

    /// Request timeout in seconds
    pub request_timeout_secs: Option<u64>,

    /// Packet batches buffered between transport and reconciler
    pub stream_channel_capacity: Option<usize>,
}

/// Chat section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatToml {
    /// Document token budget used until the backend reports one
    pub default_max_document_tokens: Option<u32>,

    /// Tokens kept free when selecting documents
    pub document_token_reserve: Option<u32>,

    /// Maximum characters of a derived session name
    pub session_name_max_chars: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// API section
    pub api: ApiToml,

    /// Chat section
    pub chat: ChatToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Centralized configuration for the chat client
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the chat backend
    pub api_url: String,

    /// Request timeout
    pub request_timeout: Duration,

    /// Packet batches buffered between transport and reconciler
    pub stream_channel_capacity: usize,

    /// Document token budget used until the backend reports one
    pub default_max_document_tokens: u32,

    /// Tokens kept free when selecting documents
    pub document_token_reserve: u32,

    /// Maximum characters of a derived session name
    pub session_name_max_chars: usize,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".to_string(),
            request_timeout: Duration::from_secs(120),
            stream_channel_capacity: 64,
            default_max_document_tokens: 4096,
            document_token_reserve: DEFAULT_TOKEN_RESERVE,
            session_name_max_chars: 50,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Check values that would make the client unusable
    ///
    /// # Errors
    ///
    /// [`ConfigError::ValidationError`] naming the offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "api url must start with http:// or https://, got {:?}",
                self.api_url
            )));
        }
        if self.stream_channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "stream_channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.session_name_max_chars == 0 {
            return Err(ConfigError::ValidationError(
                "session_name_max_chars must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/pridox/client.toml` or
/// `~/.config/pridox/client.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("pridox").join("client.toml"))
}

/// Load configuration from the default path, the environment and defaults
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    let mut config = ClientConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ClientToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config);

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ClientConfig, toml: &ClientToml) {
    if let Some(ref url) = toml.api.url {
        config.api_url.clone_from(url);
    }
    if let Some(secs) = toml.api.request_timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }
    if let Some(capacity) = toml.api.stream_channel_capacity {
        config.stream_channel_capacity = capacity;
    }

    if let Some(tokens) = toml.chat.default_max_document_tokens {
        config.default_max_document_tokens = tokens;
    }
    if let Some(reserve) = toml.chat.document_token_reserve {
        config.document_token_reserve = reserve;
    }
    if let Some(chars) = toml.chat.session_name_max_chars {
        config.session_name_max_chars = chars;
    }
}

/// Apply environment variable overrides
fn apply_env_config(config: &mut ClientConfig) {
    if let Ok(url) = std::env::var("PRIDOX_API_URL") {
        if !url.is_empty() {
            config.api_url = url;
            config.source = ConfigSource::Env;
        }
    }
    if let Ok(timeout) = std::env::var("PRIDOX_REQUEST_TIMEOUT_SECS") {
        if let Ok(secs) = timeout.parse::<u64>() {
            config.request_timeout = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        }
    }
    if let Ok(tokens) = std::env::var("PRIDOX_MAX_DOCUMENT_TOKENS") {
        if let Ok(n) = tokens.parse::<u32>() {
            config.default_max_document_tokens = n;
            config.source = ConfigSource::Env;
        }
    }
}

// =============================================================================
// CLI Overrides
// =============================================================================

/// Values given on the command line, applied last
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// API URL override
    pub api_url: Option<String>,

    /// Request timeout override (seconds)
    pub request_timeout_secs: Option<u64>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set API URL override
    #[must_use]
    pub fn with_api_url(mut self, url: String) -> Self {
        self.api_url = Some(url);
        self
    }

    /// Set request timeout override
    #[must_use]
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    /// Whether any override is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.api_url.is_none() && self.request_timeout_secs.is_none()
    }

    /// Apply overrides to a loaded configuration
    pub fn apply(&self, config: &mut ClientConfig) {
        if let Some(ref url) = self.api_url {
            config.api_url.clone_from(url);
        }
        if let Some(secs) = self.request_timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }
        if !self.is_empty() {
            config.source = ConfigSource::Cli;
        }
    }
}
