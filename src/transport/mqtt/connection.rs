//! Pure connection state management for the MQTT wire client
//!
//! Option building and state transitions live here so they can be tested
//! without a broker.

use crate::broker::Broker;
use crate::config::MqttSection;
use rumqttc::v5::MqttOptions;
use thiserror::Error;

/// Connection state of a single wire session
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Socket opened, waiting for ConnAck
    Connecting,
    /// ConnAck received; publish and subscribe are allowed
    Connected,
    /// Session ended with reason
    Disconnected(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Wire-level transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection to {broker} failed: {reason}")]
    ConnectionFailed { broker: String, reason: String },
    #[error("No ConnAck from {broker} within {timeout_ms}ms")]
    ConnAckTimeout { broker: String, timeout_ms: u64 },
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
    #[error("Publishing failed")]
    PublishFailed(#[source] rumqttc::v5::ClientError),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] rumqttc::v5::ClientError),
    #[error("Disconnect failed")]
    Disconnect(#[source] rumqttc::v5::ClientError),
}

/// Build a unique client identifier from the configured prefix
pub fn build_client_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}

/// Build rumqttc options for one connection attempt to `broker`
///
/// Every attempt gets a fresh client id so a lingering session on the broker
/// never collides with the new one.
pub fn configure_mqtt_options(broker: &Broker, config: &MqttSection) -> MqttOptions {
    let client_id = build_client_id(&config.client_id_prefix);
    let mut mqtt_options = MqttOptions::new(client_id, broker.host.clone(), broker.port);

    mqtt_options.set_keep_alive(config.keep_alive());
    mqtt_options.set_clean_start(true);

    if let Some((username, password)) = credentials_from_env(config) {
        mqtt_options.set_credentials(username, password);
    }

    mqtt_options
}

/// Resolve username and password from the configured environment variables
///
/// A missing password variable yields an empty password; a missing username
/// disables authentication.
pub fn credentials_from_env(config: &MqttSection) -> Option<(String, String)> {
    let username_env = config.username_env.as_ref()?;
    let username = std::env::var(username_env).ok()?;
    let password = config
        .password_env
        .as_ref()
        .and_then(|env_name| std::env::var(env_name).ok())
        .unwrap_or_default();
    Some((username, password))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_mqtt_config() -> MqttSection {
        MqttSection {
            client_id_prefix: "test".to_string(),
            keep_alive_secs: 30,
            connect_timeout_ms: 1000,
            username_env: None,
            password_env: None,
        }
    }

    #[test]
    fn test_client_ids_are_unique() {
        let a = build_client_id("brokerlink");
        let b = build_client_id("brokerlink");
        assert!(a.starts_with("brokerlink-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_configure_mqtt_options_targets_broker() {
        let broker = Broker::new("secondary", "mq2.local", 1884, 2);
        let options = configure_mqtt_options(&broker, &test_mqtt_config());

        assert_eq!(
            options.broker_address(),
            ("mq2.local".to_string(), 1884)
        );
        assert_eq!(options.keep_alive(), Duration::from_secs(30));
        assert!(options.client_id().starts_with("test-"));
    }

    #[test]
    fn test_credentials_absent_without_env_names() {
        assert!(credentials_from_env(&test_mqtt_config()).is_none());
    }

    #[test]
    fn test_credentials_from_env() {
        let mut config = test_mqtt_config();
        config.username_env = Some("BROKERLINK_TEST_CRED_USER".to_string());
        config.password_env = Some("BROKERLINK_TEST_CRED_PASS_UNSET".to_string());

        std::env::set_var("BROKERLINK_TEST_CRED_USER", "sensor");
        let creds = credentials_from_env(&config);
        std::env::remove_var("BROKERLINK_TEST_CRED_USER");

        assert_eq!(creds, Some(("sensor".to_string(), String::new())));
    }

    #[test]
    fn test_connection_state() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert_ne!(
            ConnectionState::Connected,
            ConnectionState::Disconnected("test".to_string())
        );
    }

    #[test]
    fn test_mqtt_error_display() {
        let errors = vec![
            MqttError::ConnectionFailed {
                broker: "primary (localhost:1883)".to_string(),
                reason: "refused".to_string(),
            },
            MqttError::ConnAckTimeout {
                broker: "primary (localhost:1883)".to_string(),
                timeout_ms: 500,
            },
            MqttError::NotConnected {
                state: ConnectionState::Disconnected("test".to_string()),
            },
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
