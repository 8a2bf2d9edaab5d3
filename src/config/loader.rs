//! Configuration loader with environment variable expansion

use super::{expand_env_vars, Config, ConfigError};
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let mut config = Self::read(path.as_ref())?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent
    ///
    /// Environment overrides are applied in both cases, so a missing file
    /// plus `RUNPILOT_API_URL` is a complete configuration.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::read(path)?
        } else {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            Config::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document after expanding `${VAR}` placeholders
    pub fn parse(content: &str) -> Result<Config, ConfigError> {
        let expanded = expand_env_vars(content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_parse_expands_env_vars() {
        std::env::set_var("RUNPILOT_TEST_TOKEN", "secret-token");
        let content = "api:\n  base_url: http://localhost:8000\n  token: ${RUNPILOT_TEST_TOKEN}\n";
        let config = ConfigLoader::parse(content).unwrap();
        assert_eq!(config.api.token.as_deref(), Some("secret-token"));
        std::env::remove_var("RUNPILOT_TEST_TOKEN");
    }

    #[test]
    fn test_parse_applies_defaults() {
        let config = ConfigLoader::parse("api:\n  base_url: http://localhost:8000\n").unwrap();
        assert_eq!(config.upload.chunk_size, crate::config::DEFAULT_CHUNK_SIZE);
        assert_eq!(config.logging.level, "info");
        assert!(config.api.user_agent.starts_with("runpilot/"));
    }

    #[test]
    #[serial]
    fn test_load_or_default_uses_env_when_file_missing() {
        std::env::set_var(crate::config::API_URL_ENV, "http://localhost:9999");
        let config = ConfigLoader::load_or_default("/nonexistent/runpilot.yaml").unwrap();
        assert_eq!(config.api.base_url, "http://localhost:9999");
        std::env::remove_var(crate::config::API_URL_ENV);
    }

    #[test]
    #[serial]
    fn test_load_reads_file() {
        std::env::remove_var(crate::config::API_URL_ENV);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runpilot.yaml");
        std::fs::write(
            &path,
            "api:\n  base_url: http://localhost:8000\nupload:\n  chunk_size: 4096\n",
        )
        .unwrap();

        let config = ConfigLoader::load(&path).unwrap();
        assert_eq!(config.api.base_url, "http://localhost:8000");
        assert_eq!(config.upload.chunk_size, 4096);

        let config = ConfigLoader::load(path.to_string_lossy().into_owned()).unwrap();
        assert_eq!(config.upload.chunk_size, 4096);
    }
}
