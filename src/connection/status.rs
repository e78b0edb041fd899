//! Connection status events

use crate::broker::Broker;

/// Transitions of the manager's active session, broadcast to observers
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    /// A session to this broker is now active
    Connected(Broker),
    /// The selected broker refused or failed the connection; it was demoted
    ConnectFailed { broker: Broker, reason: String },
    /// Selection found no healthy broker
    NoHealthyBroker,
    /// The active session was dropped after a transport failure
    SessionInvalidated { broker: Broker, reason: String },
    /// Closed on request
    Disconnected,
}

impl ConnectionStatus {
    pub fn broker(&self) -> Option<&Broker> {
        match self {
            ConnectionStatus::Connected(broker)
            | ConnectionStatus::ConnectFailed { broker, .. }
            | ConnectionStatus::SessionInvalidated { broker, .. } => Some(broker),
            ConnectionStatus::NoHealthyBroker | ConnectionStatus::Disconnected => None,
        }
    }
}
