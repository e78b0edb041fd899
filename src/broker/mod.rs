//! Broker model and registry
//!
//! A [`Broker`] is a remote MQTT endpoint identified by host and port. The
//! [`BrokerRegistry`] owns the static list of known brokers together with their
//! mutable health flags, and implements priority-based selection.

pub mod registry;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

pub use registry::{BrokerRegistry, RegistryError};

/// Stable identity of a broker within the registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BrokerKey {
    pub host: String,
    pub port: u16,
}

impl BrokerKey {
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for BrokerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A known broker and its last observed health
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Broker {
    /// Display name
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Lower values are preferred during selection
    pub priority: i32,
    pub healthy: bool,
    pub last_checked_at: DateTime<Utc>,
}

impl Broker {
    /// Create a broker in the optimistic initial state (healthy, checked now)
    pub fn new<N: Into<String>, H: Into<String>>(name: N, host: H, port: u16, priority: i32) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            priority,
            healthy: true,
            last_checked_at: Utc::now(),
        }
    }

    pub fn key(&self) -> BrokerKey {
        BrokerKey::new(self.host.clone(), self.port)
    }

    pub fn is_at(&self, host: &str, port: u16) -> bool {
        self.host == host && self.port == port
    }
}

impl fmt::Display for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.name, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_broker_starts_healthy() {
        let broker = Broker::new("primary", "mqtt1.local", 1883, 1);
        assert!(broker.healthy);
        assert_eq!(broker.priority, 1);
        assert_eq!(broker.key(), BrokerKey::new("mqtt1.local", 1883));
    }

    #[test]
    fn test_display_formats() {
        let broker = Broker::new("primary", "mqtt1.local", 1883, 1);
        assert_eq!(broker.to_string(), "primary (mqtt1.local:1883)");
        assert_eq!(broker.key().to_string(), "mqtt1.local:1883");
    }

    #[test]
    fn test_is_at_matches_host_and_port() {
        let broker = Broker::new("primary", "mqtt1.local", 1883, 1);
        assert!(broker.is_at("mqtt1.local", 1883));
        assert!(!broker.is_at("mqtt1.local", 1884));
        assert!(!broker.is_at("mqtt2.local", 1883));
    }
}
