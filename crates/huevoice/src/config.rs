//! Configuration file parsing and persistence.
//!
//! huevoice keeps everything in one TOML file. Daemon settings (`logging`,
//! `mqtt`, `bridge`) are written by the operator; the `global` and `secret`
//! groups hold the bridge address and access credential and are rewritten by
//! the daemon after pairing.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;

use crate::bridge::BridgeCredential;
use crate::bridge::PairingPolicy;

/// Top-level configuration structure
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub mqtt: MqttConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Non-secret bridge settings discovered at runtime
    #[serde(default)]
    pub global: GlobalConfig,

    /// Access credential obtained by pairing
    #[serde(default)]
    pub secret: SecretConfig,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `rumqttc = "warn"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

fn default_broker() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "huevoice".to_string()
}

/// Connection to the dialogue engine's MQTT bus
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address
    #[serde(default = "default_broker")]
    pub broker: String,

    /// MQTT broker port
    #[serde(default = "default_port")]
    pub port: u16,

    /// MQTT client ID
    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: default_broker(),
            port: default_port(),
            client_id: default_client_id(),
            username: None,
            password: None,
        }
    }
}

fn default_discovery_url() -> String {
    "https://discovery.meethue.com/".to_string()
}

fn default_device_type() -> String {
    "huevoice".to_string()
}

fn default_pairing_interval_secs() -> u64 {
    2
}

/// How the bridge is found and paired with
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// Public endpoint listing bridges on the caller's network
    #[serde(default = "default_discovery_url")]
    pub discovery_url: String,

    /// `devicetype` announced to the bridge when pairing
    #[serde(default = "default_device_type")]
    pub device_type: String,

    /// Delay between pairing attempts while waiting for the link button
    #[serde(default = "default_pairing_interval_secs")]
    pub pairing_interval_secs: u64,

    /// Give up pairing after this many attempts (unbounded when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairing_max_attempts: Option<u32>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            discovery_url: default_discovery_url(),
            device_type: default_device_type(),
            pairing_interval_secs: default_pairing_interval_secs(),
            pairing_max_attempts: None,
        }
    }
}

impl BridgeConfig {
    pub fn pairing_policy(&self) -> PairingPolicy {
        PairingPolicy {
            interval: Duration::from_secs(self.pairing_interval_secs),
            max_attempts: self.pairing_max_attempts,
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_ip: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct SecretConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Load the file, writing a default one first if it does not exist yet
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No config at {}, writing defaults", path.display());
            Self::default().save(path)?;
        }
        Self::from_file(path)
    }

    /// Write the configuration back to disk
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path.as_ref(), contents)
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))
    }

    /// Stored address and key, as far as they are known
    pub fn stored_credential(&self) -> (Option<String>, Option<String>) {
        (self.global.bridge_ip.clone(), self.secret.api_key.clone())
    }

    /// Replace the stored address and key
    pub fn set_credential(&mut self, credential: &BridgeCredential) {
        self.global.bridge_ip = Some(credential.bridge_ip.clone());
        self.secret.api_key = Some(credential.api_key.clone());
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[source] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.mqtt.broker, "localhost");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.bridge.pairing_interval_secs, 2);
        assert!(config.global.bridge_ip.is_none());
        assert!(config.secret.api_key.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [logging]
            level = "debug"
            overrides.rumqttc = "warn"

            [mqtt]
            broker = "snips.local"
            port = 1884
            client_id = "hue-skill"
            username = "snips"

            [bridge]
            device_type = "kitchen-pi"
            pairing_interval_secs = 5
            pairing_max_attempts = 30

            [global]
            bridge_ip = "192.168.1.20"

            [secret]
            api_key = "abc123"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.overrides["rumqttc"], LogLevel::Warn);
        assert_eq!(config.mqtt.broker, "snips.local");
        assert_eq!(config.mqtt.username.as_deref(), Some("snips"));
        assert_eq!(config.bridge.device_type, "kitchen-pi");

        let policy = config.bridge.pairing_policy();
        assert_eq!(policy.interval, Duration::from_secs(5));
        assert_eq!(policy.max_attempts, Some(30));

        let (ip, key) = config.stored_credential();
        assert_eq!(ip.as_deref(), Some("192.168.1.20"));
        assert_eq!(key.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_set_credential() {
        let mut config = Config::default();
        config.set_credential(&BridgeCredential {
            bridge_ip: "10.0.0.2".to_string(),
            api_key: "newkey".to_string(),
        });

        let rendered = toml::to_string_pretty(&config).unwrap();
        assert!(rendered.contains("[global]"));
        assert!(rendered.contains("bridge_ip = \"10.0.0.2\""));
        assert!(rendered.contains("[secret]"));
        assert!(rendered.contains("api_key = \"newkey\""));
    }
}
