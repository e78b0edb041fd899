//! Broker reachability probes
//!
//! A probe answers a single question about a single broker: can it be reached
//! right now? Callers bound every probe with their own timeout as well.

use crate::broker::Broker;
use crate::config::{MqttSection, ProbeKind};
use crate::transport::mqtt::connection::{build_client_id, credentials_from_env};
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet};
use rumqttc::v5::{AsyncClient, Event, MqttOptions};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("MQTT error: {0}")]
    Mqtt(String),
}

/// Reachability check for one broker
#[async_trait]
pub trait Probe: Send + Sync {
    /// `Ok(true)` when reachable; `Ok(false)` or `Err` both mean unhealthy
    async fn probe(&self, broker: &Broker) -> Result<bool, ProbeError>;

    fn name(&self) -> &str;
}

/// Healthy when a TCP connection to the broker opens within the timeout
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn probe(&self, broker: &Broker) -> Result<bool, ProbeError> {
        let connect = TcpStream::connect((broker.host.as_str(), broker.port));
        match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(_stream)) => Ok(true),
            Ok(Err(e)) => Err(ProbeError::Io(e)),
            Err(_) => Err(ProbeError::Timeout(self.timeout)),
        }
    }

    fn name(&self) -> &str {
        "tcp"
    }
}

/// Healthy when the broker accepts a full MQTT CONNECT within the timeout
pub struct MqttProbe {
    timeout: Duration,
    settings: MqttSection,
}

impl MqttProbe {
    pub fn new(timeout: Duration, settings: MqttSection) -> Self {
        Self { timeout, settings }
    }

    fn options_for(&self, broker: &Broker) -> MqttOptions {
        let client_id = build_client_id(&format!("{}-probe", self.settings.client_id_prefix));
        let mut options = MqttOptions::new(client_id, broker.host.clone(), broker.port);
        options.set_keep_alive(self.settings.keep_alive());
        options.set_clean_start(true);
        if let Some((username, password)) = credentials_from_env(&self.settings) {
            options.set_credentials(username, password);
        }
        options
    }
}

#[async_trait]
impl Probe for MqttProbe {
    async fn probe(&self, broker: &Broker) -> Result<bool, ProbeError> {
        let (client, mut event_loop) = AsyncClient::new(self.options_for(broker), 10);

        let handshake = async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        return Ok(ack.code == ConnectReturnCode::Success);
                    }
                    Ok(_) => continue,
                    Err(e) => return Err(ProbeError::Mqtt(e.to_string())),
                }
            }
        };

        let accepted = match tokio::time::timeout(self.timeout, handshake).await {
            Ok(result) => result?,
            Err(_) => return Err(ProbeError::Timeout(self.timeout)),
        };

        if accepted {
            // Flush DISCONNECT so the broker does not log an abrupt close
            if client.disconnect().await.is_ok() {
                let _ = tokio::time::timeout(Duration::from_millis(200), event_loop.poll()).await;
            }
        }
        debug!(broker = %broker, accepted, "MQTT probe finished");
        Ok(accepted)
    }

    fn name(&self) -> &str {
        "mqtt"
    }
}

/// Build the probe selected in configuration
pub fn build_probe(kind: ProbeKind, timeout: Duration, settings: &MqttSection) -> Arc<dyn Probe> {
    match kind {
        ProbeKind::Tcp => Arc::new(TcpProbe::new(timeout)),
        ProbeKind::Mqtt => Arc::new(MqttProbe::new(timeout, settings.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unused_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_tcp_probe_open_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let broker = Broker::new("local", "127.0.0.1", port, 1);

        let probe = TcpProbe::new(Duration::from_secs(1));
        assert!(probe.probe(&broker).await.unwrap());
    }

    #[tokio::test]
    async fn test_tcp_probe_closed_port() {
        let broker = Broker::new("closed", "127.0.0.1", unused_port(), 1);

        let probe = TcpProbe::new(Duration::from_secs(1));
        assert!(matches!(probe.probe(&broker).await, Err(ProbeError::Io(_))));
    }

    #[tokio::test]
    async fn test_mqtt_probe_times_out_on_silent_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let broker = Broker::new("silent", "127.0.0.1", port, 1);
        let probe = MqttProbe::new(Duration::from_millis(200), MqttSection::default());

        assert!(matches!(
            probe.probe(&broker).await,
            Err(ProbeError::Timeout(_))
        ));
    }

    #[test]
    fn test_build_probe_kind() {
        let settings = MqttSection::default();
        assert_eq!(
            build_probe(ProbeKind::Tcp, Duration::from_secs(1), &settings).name(),
            "tcp"
        );
        assert_eq!(
            build_probe(ProbeKind::Mqtt, Duration::from_secs(1), &settings).name(),
            "mqtt"
        );
    }
}
