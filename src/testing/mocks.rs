//! Mock implementations for testing
//!
//! Provides a scripted [`WireClient`] and [`Probe`] so the connection manager,
//! the health monitor and the services can be exercised without a broker.

use crate::broker::{Broker, BrokerKey};
use crate::health::{Probe, ProbeError};
use crate::transport::{InboundMessage, WireClient};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MockWireError {
    #[error("Mock connection to {0} refused")]
    ConnectRefused(BrokerKey),
    #[error("Mock client not connected")]
    NotConnected,
    #[error("Mock publish failure")]
    PublishFailed,
    #[error("Mock subscribe failure")]
    SubscribeFailed,
}

/// A message accepted by [`MockWireClient::publish`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub broker: BrokerKey,
    pub topic: String,
    pub payload: String,
}

#[derive(Debug, Default)]
struct MockWireState {
    current: Option<Broker>,
    refused: HashSet<BrokerKey>,
    connect_attempts: Vec<BrokerKey>,
    published: Vec<PublishedMessage>,
    subscriptions: Vec<(BrokerKey, String)>,
    inbound: Option<mpsc::Sender<InboundMessage>>,
    retained: Vec<InboundMessage>,
}

/// Mock wire client with scripted failures and call recording
#[derive(Debug, Default)]
pub struct MockWireClient {
    state: Mutex<MockWireState>,
    connected: AtomicBool,
    fail_next_publish: AtomicBool,
    fail_next_subscribe: AtomicBool,
}

impl MockWireClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockWireState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refuse every connection attempt to `key` until [`Self::accept_connect_to`]
    pub fn fail_connect_to(&self, key: BrokerKey) {
        self.state().refused.insert(key);
    }

    pub fn accept_connect_to(&self, key: &BrokerKey) {
        self.state().refused.remove(key);
    }

    pub fn fail_next_publish(&self) {
        self.fail_next_publish.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_subscribe(&self) {
        self.fail_next_subscribe.store(true, Ordering::SeqCst);
    }

    /// Queue a message delivered right after the next accepted subscribe,
    /// the way a broker sends retained messages
    pub fn deliver_on_subscribe(&self, topic: &str, payload: &str) {
        self.state().retained.push(InboundMessage::new(topic, payload));
    }

    /// Simulate the session dying underneath the client
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn connect_attempts(&self) -> Vec<BrokerKey> {
        self.state().connect_attempts.clone()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state().published.clone()
    }

    pub fn subscriptions(&self) -> Vec<(BrokerKey, String)> {
        self.state().subscriptions.clone()
    }

    pub fn current_broker(&self) -> Option<Broker> {
        self.state().current.clone()
    }

    /// Deliver a message as if it arrived from the broker
    ///
    /// Returns false when no inbound sender is installed or the receiver is gone.
    pub async fn inject(&self, topic: &str, payload: &str) -> bool {
        let sender = self.state().inbound.clone();
        match sender {
            Some(sender) => sender
                .send(InboundMessage::new(topic, payload))
                .await
                .is_ok(),
            None => false,
        }
    }

    fn connected_key(&self) -> Result<BrokerKey, MockWireError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(MockWireError::NotConnected);
        }
        self.state()
            .current
            .as_ref()
            .map(Broker::key)
            .ok_or(MockWireError::NotConnected)
    }
}

#[async_trait]
impl WireClient for MockWireClient {
    type Error = MockWireError;

    async fn connect(&self, broker: &Broker) -> Result<(), MockWireError> {
        let key = broker.key();
        let mut state = self.state();
        state.connect_attempts.push(key.clone());

        if state.refused.contains(&key) {
            state.current = None;
            self.connected.store(false, Ordering::SeqCst);
            return Err(MockWireError::ConnectRefused(key));
        }

        state.current = Some(broker.clone());
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), MockWireError> {
        let broker = self.connected_key()?;
        if self.fail_next_publish.swap(false, Ordering::SeqCst) {
            return Err(MockWireError::PublishFailed);
        }
        self.state().published.push(PublishedMessage {
            broker,
            topic: topic.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<(), MockWireError> {
        let broker = self.connected_key()?;
        if self.fail_next_subscribe.swap(false, Ordering::SeqCst) {
            return Err(MockWireError::SubscribeFailed);
        }
        let (retained, sender) = {
            let mut state = self.state();
            state.subscriptions.push((broker, pattern.to_string()));
            (std::mem::take(&mut state.retained), state.inbound.clone())
        };

        if let Some(sender) = sender {
            for message in retained {
                let _ = sender.send(message).await;
            }
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), MockWireError> {
        self.connected.store(false, Ordering::SeqCst);
        self.state().current = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn set_inbound_sender(&self, sender: mpsc::Sender<InboundMessage>) {
        self.state().inbound = Some(sender);
    }
}

/// Scripted result for one broker in [`MockProbe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy,
    Unhealthy,
    Error,
    /// Never completes; exercises the caller's timeout
    Hang,
}

/// Mock probe; brokers without a scripted outcome are healthy
#[derive(Debug, Default)]
pub struct MockProbe {
    outcomes: Mutex<HashMap<BrokerKey, ProbeOutcome>>,
    probes: AtomicUsize,
}

impl MockProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_outcome(&self, key: BrokerKey, outcome: ProbeOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, outcome);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Probe for MockProbe {
    async fn probe(&self, broker: &Broker) -> Result<bool, ProbeError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&broker.key())
            .copied()
            .unwrap_or(ProbeOutcome::Healthy);

        match outcome {
            ProbeOutcome::Healthy => Ok(true),
            ProbeOutcome::Unhealthy => Ok(false),
            ProbeOutcome::Error => Err(ProbeError::Timeout(Duration::ZERO)),
            ProbeOutcome::Hang => std::future::pending().await,
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
