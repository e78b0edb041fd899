//! Periodic publishing of sensor readings

use crate::config::{DeviceSection, PublisherSection};
use crate::connection::ConnectionManager;
use crate::sensor::SensorSource;
use crate::shutdown::interruptible_sleep;
use crate::transport::WireClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Generates a reading every interval and publishes it through the manager
pub struct PublisherService<W: WireClient> {
    manager: Arc<ConnectionManager<W>>,
    sensor: Arc<dyn SensorSource>,
    device: DeviceSection,
    topic: String,
    interval: Duration,
}

impl<W: WireClient + 'static> PublisherService<W> {
    pub fn new(
        manager: Arc<ConnectionManager<W>>,
        sensor: Arc<dyn SensorSource>,
        device: DeviceSection,
        settings: &PublisherSection,
    ) -> Self {
        Self {
            manager,
            sensor,
            device,
            topic: settings.topic.clone(),
            interval: settings.interval(),
        }
    }

    /// Publish a single reading; false when it could not be delivered
    pub async fn publish_once(&self) -> bool {
        let reading = self.sensor.read(&self.device.id, &self.device.location);
        let payload = match serde_json::to_string(&reading) {
            Ok(payload) => payload,
            Err(e) => {
                error!(device = %reading.device_id, "Failed to serialize reading: {}", e);
                return false;
            }
        };

        let published = self.manager.publish(&self.topic, &payload).await;
        if published {
            info!(
                device = %reading.device_id,
                temperature = reading.temperature,
                unit = %reading.unit,
                timestamp = %reading.timestamp,
                topic = %self.topic,
                "Published temperature reading"
            );
        } else {
            warn!(device = %reading.device_id, topic = %self.topic, "Failed to publish temperature reading");
        }
        published
    }

    /// Publish on every interval until shutdown; failures never stop the loop
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            device = %self.device.id,
            location = %self.device.location,
            topic = %self.topic,
            interval_secs = self.interval.as_secs(),
            "Publisher service started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            self.publish_once().await;
            if !interruptible_sleep(&mut shutdown, self.interval).await {
                break;
            }
        }

        info!("Publisher service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{Broker, BrokerKey, BrokerRegistry};
    use crate::dispatch::Dispatcher;
    use crate::sensor::{TemperatureGenerator, TemperatureReading};
    use crate::testing::mocks::MockWireClient;

    fn service() -> (PublisherService<MockWireClient>, Arc<MockWireClient>) {
        let registry = BrokerRegistry::new(vec![
            Broker::new("primary", "mq1", 1883, 1),
            Broker::new("backup", "mq2", 1883, 2),
        ])
        .unwrap();
        let wire = Arc::new(MockWireClient::new());
        let manager = Arc::new(ConnectionManager::new(
            registry,
            wire.clone(),
            Arc::new(Dispatcher::default()),
        ));
        let publisher = PublisherService::new(
            manager,
            Arc::new(TemperatureGenerator::with_seed(11)),
            DeviceSection::default(),
            &PublisherSection::default(),
        );
        (publisher, wire)
    }

    #[tokio::test]
    async fn test_publish_once_sends_reading() {
        let (publisher, wire) = service();

        assert!(publisher.publish_once().await);

        let published = wire.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "iot/greenhouse/temperature");
        let reading: TemperatureReading = serde_json::from_str(&published[0].payload).unwrap();
        assert_eq!(reading.device_id, "sensor-001");
        assert_eq!(reading.location, "greenhouse");
    }

    #[tokio::test]
    async fn test_publish_fails_over_to_backup() {
        let (publisher, wire) = service();

        assert!(publisher.publish_once().await);
        wire.fail_next_publish();
        assert!(!publisher.publish_once().await);
        assert!(publisher.publish_once().await);

        let brokers: Vec<BrokerKey> = wire.published().into_iter().map(|m| m.broker).collect();
        assert_eq!(
            brokers,
            vec![BrokerKey::new("mq1", 1883), BrokerKey::new("mq2", 1883)]
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (publisher, wire) = service();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { publisher.run(shutdown_rx).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("publisher should stop on shutdown")
            .unwrap();
        assert_eq!(wire.published().len(), 1);
    }
}
