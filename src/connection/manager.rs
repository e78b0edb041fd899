//! Active-session ownership, selection and demotion

use super::status::ConnectionStatus;
use crate::broker::{Broker, BrokerRegistry};
use crate::dispatch::{Dispatcher, MessageHandler};
use crate::transport::{InboundMessage, WireClient};
use std::sync::{Arc, PoisonError};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

const INBOUND_CAPACITY: usize = 256;
const STATUS_CAPACITY: usize = 64;

/// Owns the single active session and routes every publish and subscribe
/// through it
///
/// The session lock is held for the whole of each operation, so at most one
/// connection attempt is ever in flight.
pub struct ConnectionManager<W: WireClient> {
    registry: BrokerRegistry,
    wire: Arc<W>,
    dispatcher: Arc<Dispatcher>,
    active: Mutex<Option<Broker>>,
    status_tx: broadcast::Sender<ConnectionStatus>,
    inbound_rx: std::sync::Mutex<Option<mpsc::Receiver<InboundMessage>>>,
}

impl<W: WireClient + 'static> ConnectionManager<W> {
    pub fn new(registry: BrokerRegistry, wire: Arc<W>, dispatcher: Arc<Dispatcher>) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        wire.set_inbound_sender(inbound_tx);
        let (status_tx, _) = broadcast::channel(STATUS_CAPACITY);

        Self {
            registry,
            wire,
            dispatcher,
            active: Mutex::new(None),
            status_tx,
            inbound_rx: std::sync::Mutex::new(Some(inbound_rx)),
        }
    }

    pub fn registry(&self) -> &BrokerRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn wire(&self) -> &Arc<W> {
        &self.wire
    }

    /// Start the task that feeds inbound messages to the dispatcher
    ///
    /// Only the first call spawns a task; later calls return `None`.
    pub fn spawn_dispatcher(&self, shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        let inbound_rx = self
            .inbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        Some(tokio::spawn(
            Arc::clone(&self.dispatcher).run(inbound_rx, shutdown),
        ))
    }

    pub fn status_events(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    pub async fn active_broker(&self) -> Option<Broker> {
        self.active.lock().await.clone()
    }

    fn emit(&self, status: ConnectionStatus) {
        // No receivers is fine
        let _ = self.status_tx.send(status);
    }

    /// Make sure a session to a healthy broker exists
    ///
    /// Returns false when no broker is healthy or the selected one cannot be
    /// reached. A broker that fails to connect is marked unhealthy.
    pub async fn ensure_connected(&self) -> bool {
        let mut active = self.active.lock().await;
        self.ensure_connected_locked(&mut active).await
    }

    async fn ensure_connected_locked(&self, active: &mut Option<Broker>) -> bool {
        if active.is_some() && self.wire.is_connected() {
            return true;
        }

        if let Some(lost) = active.take() {
            warn!(broker = %lost.name, host = %lost.host, port = lost.port, "Active session lost, selecting a broker again");
            self.emit(ConnectionStatus::SessionInvalidated {
                broker: lost,
                reason: "connection lost".to_string(),
            });
        }

        let Some(broker) = self.registry.select_healthy() else {
            error!("No healthy broker available");
            self.emit(ConnectionStatus::NoHealthyBroker);
            return false;
        };

        let span = crate::broker_span!(broker = %broker.name, host = %broker.host, port = broker.port);
        match self.wire.connect(&broker).instrument(span).await {
            Ok(()) => {
                info!(broker = %broker.name, host = %broker.host, port = broker.port, priority = broker.priority, "Connected to broker");
                if let Err(reason) = self.resubscribe(&broker).await {
                    error!(broker = %broker.name, host = %broker.host, port = broker.port, reason = %reason, "Re-subscription failed, demoting broker");
                    self.registry.set_health(&broker.host, broker.port, false);
                    if let Err(e) = self.wire.disconnect().await {
                        debug!(broker = %broker.name, "Wire client disconnect failed: {}", e);
                    }
                    self.emit(ConnectionStatus::ConnectFailed { broker, reason });
                    return false;
                }
                *active = Some(broker.clone());
                self.emit(ConnectionStatus::Connected(broker));
                true
            }
            Err(e) => {
                error!(broker = %broker.name, host = %broker.host, port = broker.port, "Connection failed: {}", e);
                self.registry.set_health(&broker.host, broker.port, false);
                self.emit(ConnectionStatus::ConnectFailed {
                    broker,
                    reason: e.to_string(),
                });
                false
            }
        }
    }

    /// Re-issue every registered subscription on a fresh session
    ///
    /// Stops at the first pattern the broker refuses; a session missing any
    /// subscription is not usable.
    async fn resubscribe(&self, broker: &Broker) -> Result<(), String> {
        for pattern in self.dispatcher.patterns() {
            self.wire
                .subscribe(&pattern)
                .await
                .map_err(|e| format!("re-subscribe to '{pattern}' failed: {e}"))?;
            debug!(broker = %broker.name, pattern = %pattern, "Re-subscribed");
        }
        Ok(())
    }

    /// Drop the session after a transport failure and demote its broker
    fn invalidate(&self, active: &mut Option<Broker>, reason: String) {
        if let Some(broker) = active.take() {
            error!(broker = %broker.name, host = %broker.host, port = broker.port, reason = %reason, "Transport failure, demoting broker");
            self.registry.set_health(&broker.host, broker.port, false);
            self.emit(ConnectionStatus::SessionInvalidated { broker, reason });
        }
    }

    /// Publish through the active session, connecting first if needed
    ///
    /// Returns false when no session could be established (nothing is sent)
    /// or when the wire publish fails.
    pub async fn publish(&self, topic: &str, payload: &str) -> bool {
        let mut active = self.active.lock().await;
        if !self.ensure_connected_locked(&mut active).await {
            warn!(topic = topic, "Publish skipped: no broker connection");
            return false;
        }

        match self.wire.publish(topic, payload).await {
            Ok(()) => {
                debug!(topic = topic, bytes = payload.len(), "Published message");
                true
            }
            Err(e) => {
                self.invalidate(&mut active, format!("publish failed: {e}"));
                false
            }
        }
    }

    /// Subscribe `handler` to `pattern`
    ///
    /// The handler is registered before the wire subscribe so retained
    /// messages delivered right after SUBACK find it, and is removed again if
    /// the broker refuses. An invalid pattern is rejected before any I/O.
    pub async fn subscribe(&self, pattern: &str, handler: Arc<dyn MessageHandler>) -> bool {
        let filter = match self.dispatcher.compile(pattern) {
            Ok(filter) => filter,
            Err(e) => {
                warn!(pattern = pattern, "Rejected subscription: {}", e);
                return false;
            }
        };

        let mut active = self.active.lock().await;
        if !self.ensure_connected_locked(&mut active).await {
            warn!(pattern = pattern, "Subscribe skipped: no broker connection");
            return false;
        }

        let id = self.dispatcher.insert(filter, handler);
        match self.wire.subscribe(pattern).await {
            Ok(()) => {
                info!(pattern = pattern, "Subscribed");
                true
            }
            Err(e) => {
                self.dispatcher.remove(id);
                self.invalidate(&mut active, format!("subscribe failed: {e}"));
                false
            }
        }
    }

    /// Close the active session, if any
    pub async fn disconnect(&self) {
        let mut active = self.active.lock().await;
        let previous = active.take();

        if let Err(e) = self.wire.disconnect().await {
            warn!("Wire client disconnect failed: {}", e);
        }

        if let Some(broker) = previous {
            info!(broker = %broker.name, "Disconnected from broker");
            self.emit(ConnectionStatus::Disconnected);
        }
    }
}
