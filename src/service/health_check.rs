//! Health-check role: the monitor loop plus the HTTP endpoint

use crate::health::HealthMonitor;
use crate::observability::HealthServer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::error;

pub struct HealthCheckService {
    monitor: Arc<HealthMonitor>,
    interval: Duration,
    server: Option<HealthServer>,
}

impl HealthCheckService {
    pub fn new(monitor: Arc<HealthMonitor>, interval: Duration) -> Self {
        Self {
            monitor,
            interval,
            server: None,
        }
    }

    /// Also serve snapshots over HTTP on `port`
    pub fn with_http(mut self, port: u16) -> Self {
        self.server = Some(HealthServer::new(port, self.monitor.subscribe_snapshots()));
        self
    }

    /// Run until shutdown; an endpoint that fails to bind is logged and the
    /// monitor keeps running
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let server_task = self.server.map(|server| {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                if let Err(e) = server.start(shutdown).await {
                    error!(port = server.port(), "Health server failed: {}", e);
                }
            })
        });

        self.monitor.run(self.interval, shutdown).await;

        if let Some(task) = server_task {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{Broker, BrokerRegistry};
    use crate::testing::mocks::MockProbe;

    #[tokio::test]
    async fn test_run_probes_and_stops() {
        let registry = BrokerRegistry::new(vec![Broker::new("a", "mq1", 1883, 1)]).unwrap();
        let monitor = Arc::new(HealthMonitor::new(
            registry,
            Arc::new(MockProbe::new()),
            Duration::from_secs(1),
        ));
        let service = HealthCheckService::new(monitor.clone(), Duration::from_secs(60)).with_http(0);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(service.run(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(monitor.latest().unwrap().cluster_healthy());

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("health-check service should stop on shutdown")
            .unwrap();
    }
}
