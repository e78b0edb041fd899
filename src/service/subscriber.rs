//! Subscription to sensor readings with periodic connection checks

use crate::config::SubscriberSection;
use crate::connection::ConnectionManager;
use crate::dispatch::{HandlerError, MessageHandler};
use crate::sensor::TemperatureReading;
use crate::shutdown::interruptible_sleep;
use crate::transport::WireClient;
use async_trait::async_trait;
use serde_json::error::Category;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Logs every received temperature reading
pub struct TemperatureLogHandler;

impl TemperatureLogHandler {
    /// Parse a payload, distinguishing valid JSON of the wrong shape from
    /// invalid JSON
    pub fn parse(payload: &str) -> Result<TemperatureReading, HandlerError> {
        serde_json::from_str(payload).map_err(|e| match e.classify() {
            Category::Data => HandlerError::Malformed(e.to_string()),
            _ => HandlerError::Json(e),
        })
    }
}

#[async_trait]
impl MessageHandler for TemperatureLogHandler {
    async fn handle(&self, topic: &str, payload: &str) -> Result<(), HandlerError> {
        match Self::parse(payload) {
            Ok(reading) => {
                info!(
                    topic = topic,
                    device = %reading.device_id,
                    temperature = reading.temperature,
                    unit = %reading.unit,
                    location = %reading.location,
                    timestamp = %reading.timestamp,
                    "Received temperature reading"
                );
                Ok(())
            }
            Err(HandlerError::Malformed(reason)) => {
                warn!(topic = topic, payload = payload, "Received malformed temperature data");
                Err(HandlerError::Malformed(reason))
            }
            Err(e) => {
                error!(topic = topic, payload = payload, "Failed to parse temperature payload: {}", e);
                Err(e)
            }
        }
    }
}

/// Holds one subscription and keeps the connection alive
pub struct SubscriberService<W: WireClient> {
    manager: Arc<ConnectionManager<W>>,
    handler: Arc<dyn MessageHandler>,
    topic: String,
    recheck_interval: Duration,
}

impl<W: WireClient + 'static> SubscriberService<W> {
    pub fn new(
        manager: Arc<ConnectionManager<W>>,
        handler: Arc<dyn MessageHandler>,
        settings: &SubscriberSection,
    ) -> Self {
        Self {
            manager,
            handler,
            topic: settings.topic.clone(),
            recheck_interval: settings.recheck_interval(),
        }
    }

    pub async fn subscribe(&self) -> bool {
        let subscribed = self
            .manager
            .subscribe(&self.topic, Arc::clone(&self.handler))
            .await;
        if subscribed {
            info!(topic = %self.topic, "Successfully subscribed");
        } else {
            error!(topic = %self.topic, "Failed to subscribe");
        }
        subscribed
    }

    /// Subscribe, then check the connection every interval until shutdown
    ///
    /// Once subscribed, reconnection re-issues the subscription on the new
    /// broker; until then the subscribe itself is retried.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(topic = %self.topic, "Subscriber service started");
        let mut subscribed = self.subscribe().await;

        while interruptible_sleep(&mut shutdown, self.recheck_interval).await {
            if !subscribed {
                subscribed = self.subscribe().await;
            } else if !self.manager.ensure_connected().await {
                warn!(topic = %self.topic, "Connection lost, will retry on next check");
            }
        }

        info!("Subscriber service stopped");
    }
}
