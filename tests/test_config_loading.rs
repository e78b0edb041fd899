//! Configuration loading and validation tests
//!
//! Tests focus on the behavior of loading a file from disk: defaults, the
//! validation errors a user sees, and the registry built from the result.

use brokerlink::broker::BrokerRegistry;
use brokerlink::config::{ClusterConfig, ConfigError, ProbeKind};
use brokerlink::dispatch::MatchMode;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    write!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let file = write_config(
        r#"
[mqtt]
client_id_prefix = "greenhouse"
username_env = "MQTT_USERNAME"
password_env = "MQTT_PASSWORD"

[[cluster.brokers]]
name = "primary"
host = "mqtt1.local"
port = 1883
priority = 1

[[cluster.brokers]]
name = "backup"
host = "mqtt2.local"
port = 1883
priority = 2

[health_check]
interval_secs = 15
probe_timeout_ms = 2000
probe = "mqtt"

[dispatch]
match_mode = "legacy"

[device]
id = "sensor-042"
location = "warehouse"

[publisher]
topic = "iot/warehouse/temperature"
interval_secs = 5

[subscriber]
topic = "iot/+/temperature"
recheck_interval_secs = 20
"#,
    );

    let config = ClusterConfig::load_from_file(file.path()).unwrap();

    assert_eq!(config.mqtt.client_id_prefix, "greenhouse");
    assert_eq!(config.mqtt.username_env.as_deref(), Some("MQTT_USERNAME"));
    assert_eq!(config.cluster.brokers.len(), 2);
    assert_eq!(config.cluster.brokers[1].name, "backup");
    assert_eq!(config.health_check.interval(), Duration::from_secs(15));
    assert_eq!(config.health_check.probe_timeout(), Duration::from_millis(2000));
    assert_eq!(config.health_check.probe, ProbeKind::Mqtt);
    assert_eq!(config.dispatch.match_mode, MatchMode::Legacy);
    assert_eq!(config.device.id, "sensor-042");
    assert_eq!(config.publisher.interval(), Duration::from_secs(5));
    assert_eq!(config.subscriber.topic, "iot/+/temperature");
}

#[test]
fn test_minimal_config_gets_defaults() {
    let file = write_config(
        r#"
[[cluster.brokers]]
name = "only"
host = "localhost"
port = 1883
"#,
    );

    let config = ClusterConfig::load_from_file(file.path()).unwrap();

    assert_eq!(config.cluster.brokers[0].priority, 0);
    assert_eq!(config.mqtt.keep_alive(), Duration::from_secs(60));
    assert_eq!(config.health_check.interval(), Duration::from_secs(30));
    assert_eq!(config.health_check.probe, ProbeKind::Tcp);
    assert_eq!(config.dispatch.match_mode, MatchMode::Strict);
    assert_eq!(config.device.location, "greenhouse");
    assert_eq!(config.publisher.topic, "iot/greenhouse/temperature");
    assert_eq!(config.subscriber.recheck_interval(), Duration::from_secs(30));
}

#[test]
fn test_missing_file_is_read_error() {
    let result = ClusterConfig::load_from_file(Path::new("/nonexistent/brokerlink.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_invalid_toml_is_parse_error() {
    let file = write_config("[[cluster.brokers]\nname = ");
    let result = ClusterConfig::load_from_file(file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_missing_cluster_section_is_parse_error() {
    let file = write_config("[mqtt]\nkeep_alive_secs = 30\n");
    let result = ClusterConfig::load_from_file(file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_duplicate_broker_address_rejected() {
    let file = write_config(
        r#"
[[cluster.brokers]]
name = "a"
host = "mqtt1.local"
port = 1883

[[cluster.brokers]]
name = "b"
host = "mqtt1.local"
port = 1883
"#,
    );

    match ClusterConfig::load_from_file(file.path()) {
        Err(ConfigError::InvalidConfig(message)) => assert!(message.contains("duplicate")),
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
}

#[test]
fn test_unknown_probe_kind_rejected() {
    let file = write_config(
        r#"
[[cluster.brokers]]
name = "a"
host = "localhost"
port = 1883

[health_check]
probe = "icmp"
"#,
    );

    assert!(matches!(
        ClusterConfig::load_from_file(file.path()),
        Err(ConfigError::TomlParse(_))
    ));
}

#[test]
fn test_zero_interval_rejected() {
    let file = write_config(
        r#"
[[cluster.brokers]]
name = "a"
host = "localhost"
port = 1883

[publisher]
interval_secs = 0
"#,
    );

    assert!(matches!(
        ClusterConfig::load_from_file(file.path()),
        Err(ConfigError::InvalidConfig(_))
    ));
}

#[test]
fn test_registry_built_from_loaded_config() {
    let file = write_config(
        r#"
[[cluster.brokers]]
name = "b1"
host = "mqtt1.local"
port = 1883
priority = 2

[[cluster.brokers]]
name = "b2"
host = "mqtt2.local"
port = 1883
priority = 1
"#,
    );

    let config = ClusterConfig::load_from_file(file.path()).unwrap();
    let registry = BrokerRegistry::from_config(&config.cluster.brokers).unwrap();

    let names: Vec<String> = registry.list_all().into_iter().map(|b| b.name).collect();
    assert_eq!(names, vec!["b1", "b2"]);
    assert_eq!(registry.select_healthy().unwrap().name, "b2");
}

#[test]
fn test_config_round_trips_through_toml() {
    let file = write_config(
        r#"
[[cluster.brokers]]
name = "a"
host = "localhost"
port = 1883
priority = 3
"#,
    );
    let config = ClusterConfig::load_from_file(file.path()).unwrap();

    let rendered = config.to_toml_string().unwrap();
    let reparsed = ClusterConfig::from_toml_str(&rendered).unwrap();

    assert_eq!(config, reparsed);
}

#[test]
fn test_bundled_sample_config_is_valid() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/brokerlink.toml");
    let config = ClusterConfig::load_from_file(&path).unwrap();

    assert_eq!(config.cluster.brokers.len(), 2);
    assert_eq!(config.subscriber.topic, "iot/+/temperature");
    assert_eq!(config.dispatch.match_mode, MatchMode::Strict);
}
