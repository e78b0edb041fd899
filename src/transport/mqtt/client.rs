//! Impure I/O operations for the MQTT wire client
//!
//! Each successful [`WireClient::connect`] owns one rumqttc event loop running
//! on its own task. The task routes events through [`EventRouter`], forwards
//! inbound publishes to the installed sender and flips the session's
//! connected flag. There is no automatic reconnection here: a dropped session
//! stays dropped until the connection manager decides where to go next.

use super::connection::{configure_mqtt_options, ConnectionState, MqttError};
use super::events::{EventRoute, EventRouter};
use crate::broker::Broker;
use crate::config::MqttSection;
use crate::transport::{InboundMessage, WireClient};
use async_trait::async_trait;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, EventLoop};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type InboundSlot = Arc<RwLock<Option<mpsc::Sender<InboundMessage>>>>;

struct Session {
    client: AsyncClient,
    broker: Broker,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// rumqttc-backed [`WireClient`] holding at most one session
pub struct MqttWireClient {
    settings: MqttSection,
    session: Mutex<Option<Session>>,
    /// Flag of the current session; replaced on every connect
    connected: RwLock<Arc<AtomicBool>>,
    inbound: InboundSlot,
}

impl MqttWireClient {
    pub fn new(settings: MqttSection) -> Self {
        Self {
            settings,
            session: Mutex::new(None),
            connected: RwLock::new(Arc::new(AtomicBool::new(false))),
            inbound: Arc::new(RwLock::new(None)),
        }
    }

    fn session_flag(&self) -> Arc<AtomicBool> {
        self.connected
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_session_flag(&self) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        let mut guard = self.connected.write().unwrap_or_else(PoisonError::into_inner);
        guard.store(false, Ordering::SeqCst);
        *guard = flag.clone();
        flag
    }

    /// Wait for ConnAck with timeout
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        broker: &Broker,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let timeout_result = tokio::time::timeout(timeout, async {
            loop {
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailed {
                        broker: broker.to_string(),
                        reason: "event loop stopped".to_string(),
                    });
                }
                match *state_rx.borrow() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected(ref reason) => {
                        return Err(MqttError::ConnectionFailed {
                            broker: broker.to_string(),
                            reason: reason.clone(),
                        });
                    }
                    ConnectionState::Connecting => continue,
                }
            }
        })
        .await;

        match timeout_result {
            Ok(result) => result,
            Err(_) => Err(MqttError::ConnAckTimeout {
                broker: broker.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Drive one session's event loop until it fails, the broker disconnects
    /// or shutdown is signalled
    async fn run_event_loop(
        mut event_loop: EventLoop,
        broker_label: String,
        state_tx: watch::Sender<ConnectionState>,
        mut shutdown_rx: watch::Receiver<bool>,
        connected: Arc<AtomicBool>,
        inbound: InboundSlot,
    ) {
        debug!(broker = %broker_label, "MQTT event loop started");
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        debug!(broker = %broker_label, "Shutdown signal received, stopping event loop");
                        break;
                    }
                }
                event_result = event_loop.poll() => match event_result {
                    Ok(event) => {
                        if !Self::process_event_route(
                            EventRouter::route_mqtt_event(&event),
                            &broker_label,
                            &state_tx,
                            &connected,
                            &inbound,
                        )
                        .await
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        let was_connected = connected.swap(false, Ordering::SeqCst);
                        if was_connected {
                            error!(broker = %broker_label, "MQTT session lost: {}", e);
                        } else {
                            debug!(broker = %broker_label, "MQTT connection attempt failed: {}", e);
                        }
                        let _ = state_tx.send(ConnectionState::Disconnected(e.to_string()));
                        break;
                    }
                },
            }
        }
        connected.store(false, Ordering::SeqCst);
        debug!(broker = %broker_label, "MQTT event loop stopped");
    }

    /// Returns true to keep polling, false to end the session
    async fn process_event_route(
        route: EventRoute,
        broker_label: &str,
        state_tx: &watch::Sender<ConnectionState>,
        connected: &AtomicBool,
        inbound: &InboundSlot,
    ) -> bool {
        match route {
            EventRoute::ConnectionAcknowledged => {
                connected.store(true, Ordering::SeqCst);
                let _ = state_tx.send(ConnectionState::Connected);
                true
            }
            EventRoute::MessageReceived { topic, payload } => {
                Self::forward_inbound(inbound, InboundMessage::new(topic, payload)).await;
                true
            }
            EventRoute::Disconnected => {
                connected.store(false, Ordering::SeqCst);
                warn!(broker = %broker_label, "Broker closed the MQTT session");
                let _ = state_tx.send(ConnectionState::Disconnected(
                    "disconnected by broker".to_string(),
                ));
                false
            }
            EventRoute::SubscriptionConfirmed { packet_id } => {
                debug!(target: "mqtt_transport", packet_id, "Subscription confirmed");
                true
            }
            EventRoute::InfrastructureEvent(event_str) => {
                debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
                true
            }
            EventRoute::OutgoingEvent => true,
        }
    }

    async fn forward_inbound(inbound: &InboundSlot, message: InboundMessage) {
        let sender = inbound
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match sender {
            Some(sender) => {
                debug!(target: "mqtt_transport", topic = %message.topic, "Received MQTT message");
                if sender.send(message).await.is_err() {
                    warn!("Inbound channel closed - message dropped");
                }
            }
            None => warn!(topic = %message.topic, "No inbound sender installed - message dropped"),
        }
    }

    /// Stop a session's event loop, giving it a moment to flush the disconnect
    async fn teardown(session: Session) {
        let Session {
            client,
            broker,
            shutdown_tx,
            mut handle,
            ..
        } = session;

        if let Err(e) = client.disconnect().await {
            debug!(broker = %broker, "Disconnect request not sent: {}", e);
        }

        if tokio::time::timeout(Duration::from_millis(500), &mut handle)
            .await
            .is_err()
        {
            let _ = shutdown_tx.send(true);
            if tokio::time::timeout(Duration::from_secs(2), &mut handle)
                .await
                .is_err()
            {
                warn!(broker = %broker, "Event loop task didn't stop gracefully, aborting");
                handle.abort();
            }
        }
    }

    async fn connected_client(&self) -> Result<AsyncClient, MqttError> {
        let guard = self.session.lock().await;
        match guard.as_ref() {
            Some(session) if self.is_connected() => Ok(session.client.clone()),
            Some(session) => Err(MqttError::NotConnected {
                state: session.state_rx.borrow().clone(),
            }),
            None => Err(MqttError::NotConnected {
                state: ConnectionState::Disconnected("no session".to_string()),
            }),
        }
    }
}

#[async_trait]
impl WireClient for MqttWireClient {
    type Error = MqttError;

    async fn connect(&self, broker: &Broker) -> Result<(), MqttError> {
        let mut guard = self.session.lock().await;
        if let Some(previous) = guard.take() {
            debug!(broker = %previous.broker, "Closing previous MQTT session");
            Self::teardown(previous).await;
        }

        let connected = self.replace_session_flag();
        let mqtt_options = configure_mqtt_options(broker, &self.settings);
        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(Self::run_event_loop(
            event_loop,
            broker.to_string(),
            state_tx,
            shutdown_rx,
            connected,
            self.inbound.clone(),
        ));

        let confirmation = Self::wait_for_connection_confirmation(
            state_rx.clone(),
            broker,
            self.settings.connect_timeout(),
        )
        .await;

        if let Err(e) = confirmation {
            let _ = shutdown_tx.send(true);
            handle.abort();
            return Err(e);
        }

        info!(broker = %broker, "MQTT session established");
        *guard = Some(Session {
            client,
            broker: broker.clone(),
            state_rx,
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), MqttError> {
        let client = self.connected_client().await?;
        client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_string())
            .await
            .map_err(MqttError::PublishFailed)?;
        debug!(target: "mqtt_transport", topic = topic, "Published message");
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<(), MqttError> {
        let client = self.connected_client().await?;
        client
            .subscribe(pattern, QoS::AtLeastOnce)
            .await
            .map_err(MqttError::SubscriptionFailed)?;
        debug!(target: "mqtt_transport", pattern = pattern, "Subscription requested");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), MqttError> {
        let session = self.session.lock().await.take();
        self.session_flag().store(false, Ordering::SeqCst);

        if let Some(session) = session {
            let broker = session.broker.clone();
            Self::teardown(session).await;
            info!(broker = %broker, "MQTT client disconnected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.session_flag().load(Ordering::SeqCst)
    }

    fn set_inbound_sender(&self, sender: mpsc::Sender<InboundMessage>) {
        *self.inbound.write().unwrap_or_else(PoisonError::into_inner) = Some(sender);
    }
}
