//! Node configuration
//!
//! Loaded from an optional TOML file; every key has a default so an empty
//! file (or no file) yields the stock deployment.
//!
//! ```toml
//! backend = "sim"
//!
//! [server]
//! address = "127.0.0.1"
//! port = 54230
//!
//! [status]
//! poll_interval_secs = 5
//!
//! [capture]
//! directory = "/var/lib/haystack"
//! ```

use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use link_protocol::Endpoint;

use crate::link::LinkSettings;
use crate::receiver::ReceiverSettings;

pub const DEFAULT_PORT: u16 = 54230;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Device driver backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Software devices with failure injection
    #[default]
    Sim,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HaystackConfig {
    pub backend: Backend,
    pub server: ServerConfig,
    pub node: NodeConfig,
    pub status: StatusConfig,
    pub receiver: ReceiverConfig,
    pub capture: CaptureConfig,
    pub radio: RadioConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    pub connect_timeout_secs: u64,
    pub recv_timeout_secs: u64,
    pub reconnect_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            connect_timeout_secs: 5,
            recv_timeout_secs: 15,
            reconnect_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    pub endpoint: Endpoint,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::Haystack,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatusConfig {
    pub poll_interval_secs: u64,
    pub radio_retry_secs: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            radio_retry_secs: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReceiverConfig {
    pub init_retry_secs: u64,
    pub max_init_attempts: u32,
    pub disarm_grace_ms: u64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            init_retry_secs: 5,
            max_init_attempts: 5,
            disarm_grace_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureConfig {
    pub enabled: bool,
    pub directory: PathBuf,
    pub prefix: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("."),
            prefix: "rxdata".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RadioConfig {
    /// Where `<name>.ftr` filter profiles live
    pub filter_directory: PathBuf,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            filter_directory: PathBuf::from("/home/sunip"),
        }
    }
}

impl HaystackConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// File settings when a path is given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("server.connect_timeout_secs", self.server.connect_timeout_secs),
            ("server.recv_timeout_secs", self.server.recv_timeout_secs),
            ("server.reconnect_interval_secs", self.server.reconnect_interval_secs),
            ("status.poll_interval_secs", self.status.poll_interval_secs),
            ("status.radio_retry_secs", self.status.radio_retry_secs),
            ("receiver.init_retry_secs", self.receiver.init_retry_secs),
            ("receiver.max_init_attempts", u64::from(self.receiver.max_init_attempts)),
            ("receiver.disarm_grace_ms", self.receiver.disarm_grace_ms),
        ];
        if let Some(&(key, _)) = nonzero.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid {
                key,
                reason: "must be greater than zero".into(),
            });
        }
        if self.server.port == 0 {
            return Err(ConfigError::Invalid {
                key: "server.port",
                reason: "must be greater than zero".into(),
            });
        }
        if self.server.address.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "server.address",
                reason: "is empty".into(),
            });
        }
        if matches!(self.node.endpoint, Endpoint::Server | Endpoint::Client) {
            return Err(ConfigError::Invalid {
                key: "node.endpoint",
                reason: format!("{} is not a radio node", self.node.endpoint),
            });
        }
        if self.capture.enabled && self.capture.prefix.is_empty() {
            return Err(ConfigError::Invalid {
                key: "capture.prefix",
                reason: "is empty".into(),
            });
        }
        Ok(())
    }

    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            address: self.server.address.clone(),
            port: self.server.port,
            node: self.node.endpoint,
            connect_timeout: Duration::from_secs(self.server.connect_timeout_secs),
            recv_timeout: Duration::from_secs(self.server.recv_timeout_secs),
            poll_interval: Duration::from_secs(self.status.poll_interval_secs),
        }
    }

    pub fn receiver_settings(&self) -> ReceiverSettings {
        ReceiverSettings {
            init_retry: Duration::from_secs(self.receiver.init_retry_secs),
            max_init_attempts: self.receiver.max_init_attempts,
            disarm_grace: Duration::from_millis(self.receiver.disarm_grace_ms),
        }
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.server.reconnect_interval_secs)
    }

    pub fn radio_retry(&self) -> Duration {
        Duration::from_secs(self.status.radio_retry_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = HaystackConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.server.port, 54230);
        assert_eq!(cfg.server.recv_timeout_secs, 15);
        assert_eq!(cfg.node.endpoint, Endpoint::Haystack);
        assert_eq!(cfg.backend, Backend::Sim);
        assert_eq!(cfg.receiver_settings().disarm_grace, Duration::from_millis(100));
        cfg.validate().unwrap();
    }

    #[test]
    fn test_partial_file() {
        let cfg = HaystackConfig::from_toml_str(
            r#"
            [server]
            address = "10.0.0.2"

            [node]
            endpoint = "roof_xband"

            [capture]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.address, "10.0.0.2");
        assert_eq!(cfg.server.port, DEFAULT_PORT);
        assert_eq!(cfg.link_settings().node, Endpoint::RoofXband);
        assert!(!cfg.capture.enabled);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = HaystackConfig::from_toml_str("[server]\nprot = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut cfg = HaystackConfig::default();
        cfg.status.poll_interval_secs = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { key: "status.poll_interval_secs", .. })
        ));
    }

    #[test]
    fn test_server_endpoint_rejected() {
        let mut cfg = HaystackConfig::default();
        cfg.node.endpoint = Endpoint::Server;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("haystack.toml");
        fs::write(&path, "[status]\npoll_interval_secs = 1\n").unwrap();

        let cfg = HaystackConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.link_settings().poll_interval, Duration::from_secs(1));
        assert!(matches!(
            HaystackConfig::load(Some(&dir.path().join("missing.toml"))),
            Err(ConfigError::Read { .. })
        ));
    }
}
