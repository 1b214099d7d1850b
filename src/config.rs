//! Configuration types for Echotap

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::MAX_LOGS;
use crate::{EchotapError, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Capture and streaming configuration
    #[serde(default)]
    pub capture: CaptureConfig,
    /// Initial credentials for the token exchange endpoints
    #[serde(default)]
    pub credentials: CredentialsConfig,
    /// Resource limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// Capture and streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Maximum number of records kept in history
    #[serde(default = "default_max_logs")]
    pub max_logs: usize,
    /// Path prefixes that are never captured
    #[serde(default = "default_excluded_prefixes")]
    pub excluded_prefixes: Vec<String>,
    /// Path of the clear-history endpoint (never captured)
    #[serde(default = "default_clear_path")]
    pub clear_path: String,
    /// Path of the event stream endpoint
    #[serde(default = "default_events_path")]
    pub events_path: String,
    /// Seconds between keep-alive comments on idle streams (0 disables)
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    /// How far a subscriber may fall behind live records before it is dropped
    #[serde(default = "default_subscriber_backlog")]
    pub subscriber_backlog: usize,
}

fn default_max_logs() -> usize {
    MAX_LOGS
}

fn default_excluded_prefixes() -> Vec<String> {
    vec!["/config".to_string()]
}

fn default_clear_path() -> String {
    "/logs/clear".to_string()
}

fn default_events_path() -> String {
    "/events".to_string()
}

fn default_keepalive_secs() -> u64 {
    15
}

fn default_subscriber_backlog() -> usize {
    256
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_logs: default_max_logs(),
            excluded_prefixes: default_excluded_prefixes(),
            clear_path: default_clear_path(),
            events_path: default_events_path(),
            keepalive_secs: default_keepalive_secs(),
            subscriber_backlog: default_subscriber_backlog(),
        }
    }
}

impl CaptureConfig {
    /// Keep-alive period for event streams, if enabled
    #[must_use]
    pub fn keepalive(&self) -> Option<Duration> {
        (self.keepalive_secs > 0).then(|| Duration::from_secs(self.keepalive_secs))
    }
}

/// Initial credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Expected client id
    pub client_id: String,
    /// Expected client secret
    pub client_secret: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            client_id: "my-client".to_string(),
            client_secret: "my-secret".to_string(),
        }
    }
}

/// Resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// Maximum request size in bytes
    pub max_request_size: usize,
    /// Maximum headers per request
    pub max_headers: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: 4096,
            max_request_size: 16 * 1024 * 1024, // 16 MB
            max_headers: 128,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EchotapError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| EchotapError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Parsed listen address
    ///
    /// # Errors
    ///
    /// Returns error if the address is not a valid socket address
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.server.listen_addr.parse().map_err(|e| {
            EchotapError::ConfigError(format!(
                "Invalid listen_addr '{}': {e}",
                self.server.listen_addr
            ))
        })
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;

        let capture = &self.capture;
        if capture.max_logs == 0 {
            return Err(EchotapError::ConfigError(
                "capture.max_logs must be > 0".to_string(),
            ));
        }

        if capture.subscriber_backlog == 0 {
            return Err(EchotapError::ConfigError(
                "capture.subscriber_backlog must be > 0".to_string(),
            ));
        }

        let paths = [
            ("clear_path", capture.clear_path.as_str()),
            ("events_path", capture.events_path.as_str()),
        ];
        for (name, path) in paths {
            if !path.starts_with('/') {
                return Err(EchotapError::ConfigError(format!(
                    "capture.{name} must start with '/': {path}"
                )));
            }
        }

        for (i, prefix) in capture.excluded_prefixes.iter().enumerate() {
            if !prefix.starts_with('/') {
                return Err(EchotapError::ConfigError(format!(
                    "capture.excluded_prefixes[{i}] must start with '/': {prefix}"
                )));
            }
        }

        if self.limits.max_connections == 0
            || self.limits.max_request_size == 0
            || self.limits.max_headers == 0
        {
            return Err(EchotapError::ConfigError(
                "limits must all be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_parse() {
        let config_toml = r#"
            [server]
            listen_addr = "127.0.0.1:8080"

            [capture]
            max_logs = 50
            excluded_prefixes = ["/config", "/admin"]
        "#;

        let config: Config = toml::from_str(config_toml).unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.capture.max_logs, 50);
        assert_eq!(config.capture.excluded_prefixes.len(), 2);
        assert_eq!(config.capture.clear_path, "/logs/clear");
        assert_eq!(config.capture.events_path, "/events");
    }

    #[test]
    fn test_config_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.capture.max_logs, MAX_LOGS);
        assert_eq!(config.credentials.client_id, "my-client");
        assert_eq!(config.capture.keepalive(), Some(Duration::from_secs(15)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        let config_toml = r#"
            [credentials]
            client_id = "abc"
            client_secret = "xyz"

            [capture]
            keepalive_secs = 0
        "#;
        file.write_all(config_toml.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.credentials.client_secret, "xyz");
        assert_eq!(config.capture.keepalive(), None);
    }

    #[test]
    fn test_invalid_config_zero_logs() {
        let config_toml = r#"
            [capture]
            max_logs = 0
        "#;

        let config: Config = toml::from_str(config_toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_config_bad_paths() {
        let mut config = Config::default();
        config.capture.events_path = "events".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.capture.excluded_prefixes = vec!["config".to_string()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.listen_addr = "not-an-addr".to_string();
        assert!(config.validate().is_err());
    }
}
