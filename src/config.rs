//! Cluster configuration loading and validation
//!
//! Configuration is read once at startup from a TOML file. Every section except
//! the broker list has defaults, so a minimal file only needs
//! `[[cluster.brokers]]` entries.

use crate::dispatch::{MatchMode, TopicFilter};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterConfig {
    #[serde(default)]
    pub mqtt: MqttSection,
    pub cluster: ClusterSection,
    #[serde(default)]
    pub health_check: HealthCheckSection,
    #[serde(default)]
    pub dispatch: DispatchSection,
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub publisher: PublisherSection,
    #[serde(default)]
    pub subscriber: SubscriberSection,
}

/// MQTT session settings shared by every broker connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Prefix for generated client IDs
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// How long to wait for CONNACK before treating a connect as failed
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            client_id_prefix: default_client_id_prefix(),
            keep_alive_secs: default_keep_alive_secs(),
            connect_timeout_ms: default_connect_timeout_ms(),
            username_env: None,
            password_env: None,
        }
    }
}

impl MqttSection {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

/// Known brokers, in registration order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterSection {
    #[serde(default)]
    pub brokers: Vec<BrokerConfig>,
}

/// Static broker descriptor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Lower number = higher priority
    #[serde(default)]
    pub priority: i32,
}

/// Probe implementation used by the health monitor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// TCP connect to the broker port
    #[default]
    Tcp,
    /// Full MQTT CONNECT/CONNACK handshake
    Mqtt,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthCheckSection {
    #[serde(default = "default_check_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default)]
    pub probe: ProbeKind,
}

impl Default for HealthCheckSection {
    fn default() -> Self {
        Self {
            interval_secs: default_check_interval_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
            probe: ProbeKind::default(),
        }
    }
}

impl HealthCheckSection {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DispatchSection {
    #[serde(default)]
    pub match_mode: MatchMode,
}

/// Identity of the simulated sensor device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    #[serde(default = "default_device_id")]
    pub id: String,
    #[serde(default = "default_device_location")]
    pub location: String,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            id: default_device_id(),
            location: default_device_location(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublisherSection {
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_publish_interval_secs")]
    pub interval_secs: u64,
}

impl Default for PublisherSection {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            interval_secs: default_publish_interval_secs(),
        }
    }
}

impl PublisherSection {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriberSection {
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_recheck_interval_secs")]
    pub recheck_interval_secs: u64,
}

impl Default for SubscriberSection {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            recheck_interval_secs: default_recheck_interval_secs(),
        }
    }
}

impl SubscriberSection {
    pub fn recheck_interval(&self) -> Duration {
        Duration::from_secs(self.recheck_interval_secs)
    }
}

fn default_client_id_prefix() -> String {
    "brokerlink".to_string()
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_check_interval_secs() -> u64 {
    30
}

fn default_probe_timeout_ms() -> u64 {
    5000
}

fn default_device_id() -> String {
    "sensor-001".to_string()
}

fn default_device_location() -> String {
    "greenhouse".to_string()
}

fn default_topic() -> String {
    "iot/greenhouse/temperature".to_string()
}

fn default_publish_interval_secs() -> u64 {
    10
}

fn default_recheck_interval_secs() -> u64 {
    30
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to render TOML: {0}")]
    TomlRender(#[from] toml::ser::Error),
    #[error("No configuration file found (tried {0})")]
    NotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClusterConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Render the effective configuration, defaults included
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ClusterConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.brokers.is_empty() {
            return Err(invalid("at least one [[cluster.brokers]] entry is required"));
        }

        let mut seen = HashSet::new();
        for broker in &self.cluster.brokers {
            if broker.host.trim().is_empty() {
                return Err(invalid(format!("broker '{}' has an empty host", broker.name)));
            }
            if broker.port == 0 {
                return Err(invalid(format!("broker '{}' has port 0", broker.name)));
            }
            if !seen.insert((broker.host.as_str(), broker.port)) {
                return Err(invalid(format!(
                    "duplicate broker address {}:{}",
                    broker.host, broker.port
                )));
            }
        }

        if self.health_check.interval_secs == 0 {
            return Err(invalid("health_check.interval_secs must be greater than 0"));
        }
        if self.health_check.probe_timeout_ms == 0 {
            return Err(invalid("health_check.probe_timeout_ms must be greater than 0"));
        }
        if self.mqtt.connect_timeout_ms == 0 {
            return Err(invalid("mqtt.connect_timeout_ms must be greater than 0"));
        }
        if self.publisher.interval_secs == 0 {
            return Err(invalid("publisher.interval_secs must be greater than 0"));
        }
        if self.subscriber.recheck_interval_secs == 0 {
            return Err(invalid(
                "subscriber.recheck_interval_secs must be greater than 0",
            ));
        }

        if self.publisher.topic.is_empty()
            || self.publisher.topic.contains(['+', '#'])
        {
            return Err(invalid(format!(
                "publisher.topic '{}' must be a non-empty topic without wildcards",
                self.publisher.topic
            )));
        }

        TopicFilter::parse(&self.subscriber.topic, self.dispatch.match_mode).map_err(|e| {
            invalid(format!(
                "subscriber.topic '{}' is not a valid filter: {e}",
                self.subscriber.topic
            ))
        })?;

        Ok(())
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[[cluster.brokers]]
name = "primary"
host = "localhost"
port = 1883
priority = 1

[[cluster.brokers]]
name = "secondary"
host = "localhost"
port = 1884
priority = 2
"#;
        Self::from_toml_str(toml_content).expect("Test config should parse")
    }
}

fn invalid<S: Into<String>>(message: S) -> ConfigError {
    ConfigError::InvalidConfig(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = ClusterConfig::test_config();

        assert_eq!(config.cluster.brokers.len(), 2);
        assert_eq!(config.health_check.interval_secs, 30);
        assert_eq!(config.health_check.probe, ProbeKind::Tcp);
        assert_eq!(config.dispatch.match_mode, MatchMode::Strict);
        assert_eq!(config.mqtt.keep_alive_secs, 60);
        assert_eq!(config.publisher.topic, "iot/greenhouse/temperature");
        assert_eq!(config.publisher.interval_secs, 10);
        assert_eq!(config.device.location, "greenhouse");
    }

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[mqtt]
client_id_prefix = "plant-a"
keep_alive_secs = 30
connect_timeout_ms = 2000
username_env = "MQTT_USERNAME"

[[cluster.brokers]]
name = "edge"
host = "10.0.0.5"
port = 1883
priority = 5

[health_check]
interval_secs = 15
probe_timeout_ms = 750
probe = "mqtt"

[dispatch]
match_mode = "legacy"

[device]
id = "dev-9"
location = "warehouse"

[publisher]
topic = "plant/a/temp"
interval_secs = 3

[subscriber]
topic = "plant/+/temp"
recheck_interval_secs = 12
"#;
        let config = ClusterConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.mqtt.client_id_prefix, "plant-a");
        assert_eq!(config.mqtt.connect_timeout(), Duration::from_millis(2000));
        assert_eq!(config.mqtt.username_env.as_deref(), Some("MQTT_USERNAME"));
        assert_eq!(config.cluster.brokers[0].priority, 5);
        assert_eq!(config.health_check.probe, ProbeKind::Mqtt);
        assert_eq!(config.health_check.probe_timeout(), Duration::from_millis(750));
        assert_eq!(config.dispatch.match_mode, MatchMode::Legacy);
        assert_eq!(config.device.id, "dev-9");
        assert_eq!(config.subscriber.recheck_interval(), Duration::from_secs(12));
    }

    #[test]
    fn test_empty_broker_list_rejected() {
        let result = ClusterConfig::from_toml_str("[cluster]\nbrokers = []\n");
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_duplicate_broker_rejected() {
        let toml_content = r#"
[[cluster.brokers]]
name = "a"
host = "mqtt.local"
port = 1883

[[cluster.brokers]]
name = "b"
host = "mqtt.local"
port = 1883
"#;
        let err = ClusterConfig::from_toml_str(toml_content).unwrap_err();
        assert!(err.to_string().contains("duplicate broker address"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = ClusterConfig::test_config();
        config.health_check.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_wildcard_publish_topic_rejected() {
        let mut config = ClusterConfig::test_config();
        config.publisher.topic = "iot/+/temperature".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_subscriber_filter_rejected_in_strict_mode() {
        let mut config = ClusterConfig::test_config();
        config.subscriber.topic = "iot/#/temperature".to_string();
        assert!(config.validate().is_err());

        config.dispatch.match_mode = MatchMode::Legacy;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_probe_kind_rejected() {
        let toml_content = r#"
[[cluster.brokers]]
name = "a"
host = "mqtt.local"
port = 1883

[health_check]
probe = "icmp"
"#;
        let result = ClusterConfig::from_toml_str(toml_content);
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }
}
