//! Periodic health monitoring of every registered broker

use super::probe::Probe;
use super::snapshot::ClusterHealthSnapshot;
use crate::broker::{Broker, BrokerRegistry};
use crate::shutdown::interruptible_sleep;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Probes brokers and writes the results back into the registry
pub struct HealthMonitor {
    registry: BrokerRegistry,
    probe: Arc<dyn Probe>,
    probe_timeout: Duration,
    snapshot_tx: watch::Sender<Option<ClusterHealthSnapshot>>,
}

impl HealthMonitor {
    pub fn new(registry: BrokerRegistry, probe: Arc<dyn Probe>, probe_timeout: Duration) -> Self {
        let (snapshot_tx, _) = watch::channel(None);
        Self {
            registry,
            probe,
            probe_timeout,
            snapshot_tx,
        }
    }

    /// Receiver of the snapshot produced by each cycle; `None` before the first
    pub fn subscribe_snapshots(&self) -> watch::Receiver<Option<ClusterHealthSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub fn latest(&self) -> Option<ClusterHealthSnapshot> {
        self.snapshot_tx.borrow().clone()
    }

    /// Run one cycle: probe every broker concurrently, record each outcome,
    /// then publish and return the snapshot
    ///
    /// Probe errors and timeouts mark the broker unhealthy; the cycle itself
    /// never fails.
    pub async fn check_cluster(&self) -> ClusterHealthSnapshot {
        let brokers = self.registry.list_all();
        let outcomes =
            futures::future::join_all(brokers.iter().map(|broker| self.probe_one(broker))).await;

        for (broker, healthy) in brokers.iter().zip(&outcomes) {
            self.registry.set_health(&broker.host, broker.port, *healthy);
        }

        let snapshot = ClusterHealthSnapshot::from_outcomes(brokers.into_iter().zip(outcomes));
        self.snapshot_tx.send_replace(Some(snapshot.clone()));
        snapshot
    }

    async fn probe_one(&self, broker: &Broker) -> bool {
        match tokio::time::timeout(self.probe_timeout, self.probe.probe(broker)).await {
            Ok(Ok(true)) => {
                debug!(broker = %broker.name, host = %broker.host, port = broker.port, "Broker reachable");
                true
            }
            Ok(Ok(false)) => {
                warn!(broker = %broker.name, host = %broker.host, port = broker.port, "Broker refused health probe");
                false
            }
            Ok(Err(e)) => {
                warn!(broker = %broker.name, host = %broker.host, port = broker.port, "Health probe failed: {}", e);
                false
            }
            Err(_) => {
                warn!(
                    broker = %broker.name,
                    host = %broker.host,
                    port = broker.port,
                    timeout_ms = self.probe_timeout.as_millis() as u64,
                    "Health probe timed out"
                );
                false
            }
        }
    }

    /// Periodic monitoring loop; exits between cycles once shutdown is signalled
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = interval.as_secs(),
            probe = self.probe.name(),
            brokers = self.registry.len(),
            "Health monitor started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let snapshot = self.check_cluster().await;
            log_report(&snapshot);

            if !interruptible_sleep(&mut shutdown, interval).await {
                break;
            }
        }

        info!("Health monitor stopped");
    }
}

/// Log the outcome of one cycle
pub fn log_report(snapshot: &ClusterHealthSnapshot) {
    info!(
        healthy = snapshot.healthy().len(),
        unhealthy = snapshot.unhealthy().len(),
        total = snapshot.total(),
        cluster_healthy = snapshot.cluster_healthy(),
        "Cluster health check completed"
    );

    for broker in snapshot.healthy() {
        info!(broker = %broker.name, host = %broker.host, port = broker.port, priority = broker.priority, "Broker healthy");
    }
    for broker in snapshot.unhealthy() {
        warn!(broker = %broker.name, host = %broker.host, port = broker.port, priority = broker.priority, "Broker unhealthy");
    }

    if !snapshot.cluster_healthy() {
        error!("No healthy brokers available in the cluster");
    }
}
