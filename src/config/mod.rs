//! Configuration module for Runpilot
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation. The resulting [`Config`] is
//! passed explicitly to every component that needs it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Environment variable overriding `api.base_url`
pub const API_URL_ENV: &str = "RUNPILOT_API_URL";

/// Environment variable overriding `api.token`
pub const TOKEN_ENV: &str = "RUNPILOT_TOKEN";

/// Default chunk size for uploads (1 MiB)
pub const DEFAULT_CHUNK_SIZE: u64 = 1 << 20;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// Variable names must start with a letter or underscore and contain only
/// uppercase letters, digits, and underscores.
pub(crate) fn expand_env_vars(s: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("static regex is valid");
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);

    result
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Apply `RUNPILOT_API_URL` / `RUNPILOT_TOKEN` overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api.base_url = url;
            }
        }
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.api.token = Some(token);
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "API base URL is not set (use api.base_url or {})",
                API_URL_ENV
            )));
        }

        if !is_valid_http_url(&self.api.base_url) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid API base URL '{}': must start with http:// or https://",
                self.api.base_url
            )));
        }

        if self.upload.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "upload.chunk_size must be greater than zero".into(),
            ));
        }

        match self.logging.format.as_str() {
            "text" | "json" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid logging format '{}': must be 'text' or 'json'",
                    other
                )))
            }
        }

        Ok(())
    }
}

/// REST API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Request timeout in seconds. Requests never time out when unset.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: None,
            user_agent: default_user_agent(),
            timeout_seconds: None,
        }
    }
}

fn default_user_agent() -> String {
    format!("runpilot/{}", env!("CARGO_PKG_VERSION"))
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Delete the remote object after a failed chunk or finish step
    #[serde(default)]
    pub abort_on_failure: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            abort_on_failure: false,
        }
    }
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

/// Push-target cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(".runpilot/push_targets.json")
}

/// Credential storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
        }
    }
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from(".runpilot/credentials.json")
}

/// Logging configuration
///
/// # Example
///
/// ```yaml
/// logging:
///   level: "debug"
///   format: "json"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set. Default: "info"
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: "text" or "json". Default: "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.api.base_url = "https://api.example.com/v1".into();
        config
    }

    #[test]
    fn test_default_upload_config() {
        let config = UploadConfig::default();
        assert_eq!(config.chunk_size, 1048576);
        assert!(!config.abort_on_failure);
    }

    #[test]
    fn test_config_validation_missing_base_url() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("RUNPILOT_API_URL"));
    }

    #[test]
    fn test_config_validation_rejects_non_http_url() {
        let mut config = valid_config();
        config.api.base_url = "ftp://api.example.com".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_chunk_size() {
        let mut config = valid_config();
        config.upload.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_log_format() {
        let mut config = valid_config();
        config.logging.format = "xml".into();
        assert!(config.validate().is_err());

        config.logging.format = "json".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_expand_env_default_value() {
        let result = expand_env_vars("url: ${RUNPILOT_SURELY_UNSET_VAR:-http://localhost}");
        assert_eq!(result, "url: http://localhost");
    }

    #[test]
    fn test_expand_env_keeps_unknown_placeholder() {
        let result = expand_env_vars("token: ${RUNPILOT_SURELY_UNSET_VAR}");
        assert_eq!(result, "token: ${RUNPILOT_SURELY_UNSET_VAR}");
    }
}
