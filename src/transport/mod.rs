//! Wire-protocol transport
//!
//! The [`WireClient`] trait is the seam between the connection manager and the
//! network. It talks to exactly one broker at a time; choosing which broker is
//! the connection manager's job.

use crate::broker::Broker;
use tokio::sync::mpsc;

pub mod mqtt;

/// A message received on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: String,
}

impl InboundMessage {
    pub fn new<T: Into<String>, P: Into<String>>(topic: T, payload: P) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Single-session publish/subscribe client
///
/// A refused or failed operation is reported as `Err`.
#[async_trait::async_trait]
pub trait WireClient: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a session to `broker`, replacing any existing session
    async fn connect(&self, broker: &Broker) -> Result<(), Self::Error>;

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), Self::Error>;

    async fn subscribe(&self, pattern: &str) -> Result<(), Self::Error>;

    async fn disconnect(&self) -> Result<(), Self::Error>;

    fn is_connected(&self) -> bool;

    /// Install the channel inbound messages are forwarded to
    fn set_inbound_sender(&self, sender: mpsc::Sender<InboundMessage>);
}
