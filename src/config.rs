//! Configuration for the channel, the client driver and the server.
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```toml
//! [channel]
//! host = "10.0.0.5"
//! port = 50051
//! idle-timeout-secs = 600
//!
//! [client]
//! pacing-ms = 1000
//! ```

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 50051;

/// Where to reach the server and how to tune the underlying connections.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ChannelConfig {
    pub host: String,
    pub port: u16,
    /// TCP keep-alive on every call's connection.
    pub keepalive: bool,
    pub connect_timeout_secs: u64,
    /// Longest silence tolerated on an inbound stream before the call is dropped.
    pub idle_timeout_secs: u64,
}

impl ChannelConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            keepalive: true,
            connect_timeout_secs: 10,
            idle_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ClientConfig {
    /// Delay between consecutive samples of a burst.
    pub pacing_ms: u64,
    /// Delay between checks while the latest call has ended without a command.
    pub idle_pacing_ms: u64,
    /// Give up and stop after idling this long.
    pub idle_limit_secs: u64,
}

impl ClientConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn idle_pacing(&self) -> Duration {
        Duration::from_millis(self.idle_pacing_ms)
    }

    pub fn idle_limit(&self) -> Duration {
        Duration::from_secs(self.idle_limit_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            pacing_ms: 1000,
            idle_pacing_ms: 1000,
            idle_limit_secs: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServerConfig {
    pub bind_host: String,
    pub max_concurrent_calls: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            max_concurrent_calls: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub channel: ChannelConfig,
    pub client: ClientConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load `path` if given, otherwise fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_tuning() {
        let config = Config::default();
        assert_eq!(config.channel.addr(), "127.0.0.1:50051");
        assert_eq!(config.channel.idle_timeout(), Duration::from_secs(600));
        assert_eq!(config.client.pacing(), Duration::from_secs(1));
        assert_eq!(config.server.max_concurrent_calls, 10);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [channel]
            host = "10.1.2.3"
            idle-timeout-secs = 30

            [client]
            pacing-ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.channel.addr(), "10.1.2.3:50051");
        assert_eq!(config.channel.idle_timeout_secs, 30);
        assert!(config.channel.keepalive);
        assert_eq!(config.client.pacing(), Duration::from_millis(250));
        assert_eq!(config.client.idle_limit_secs, 600);
        assert_eq!(config.server, ServerConfig::default());
    }

    #[test]
    fn test_unparseable_file_is_error() {
        assert!(Config::from_toml("[channel]\nport = \"not a port\"").is_err());
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = Config::load(Path::new("/nonexistent/telemetry.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
