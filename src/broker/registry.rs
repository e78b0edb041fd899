//! Thread-safe broker registry with priority-based selection
//!
//! The registry never fails once constructed: lookups on unknown brokers are
//! no-ops and a poisoned lock is recovered rather than surfaced, so health and
//! selection logic cannot introduce an error path of their own.

use super::{Broker, BrokerKey};
use crate::config::BrokerConfig;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, info};

/// Registry construction errors
#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("Duplicate broker address: {0}")]
    DuplicateBroker(BrokerKey),
}

/// Shared handle to the set of known brokers
///
/// Cloning the registry clones the handle, not the brokers.
#[derive(Debug, Clone, Default)]
pub struct BrokerRegistry {
    brokers: Arc<RwLock<Vec<Broker>>>,
}

impl BrokerRegistry {
    /// Create a registry from brokers in registration order
    pub fn new(brokers: Vec<Broker>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for broker in &brokers {
            if !seen.insert(broker.key()) {
                return Err(RegistryError::DuplicateBroker(broker.key()));
            }
        }

        info!("Broker registry initialized with {} brokers", brokers.len());
        Ok(Self {
            brokers: Arc::new(RwLock::new(brokers)),
        })
    }

    /// Create a registry from configured broker descriptors
    pub fn from_config(configs: &[BrokerConfig]) -> Result<Self, RegistryError> {
        Self::new(
            configs
                .iter()
                .map(|c| Broker::new(c.name.clone(), c.host.clone(), c.port, c.priority))
                .collect(),
        )
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Broker>> {
        self.brokers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Broker>> {
        self.brokers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of every registered broker, in registration order
    pub fn list_all(&self) -> Vec<Broker> {
        self.read().clone()
    }

    /// Lowest-priority healthy broker; ties go to the earliest registered
    pub fn select_healthy(&self) -> Option<Broker> {
        let brokers = self.read();
        // min_by_key keeps the first of equal minima
        let selected = brokers
            .iter()
            .filter(|broker| broker.healthy)
            .min_by_key(|broker| broker.priority)
            .cloned();

        match &selected {
            Some(broker) => debug!(broker = %broker, priority = broker.priority, "Selected healthy broker"),
            None => debug!("No healthy broker available for selection"),
        }
        selected
    }

    /// Record a health observation for the broker at `host:port`
    ///
    /// Unknown addresses are ignored.
    pub fn set_health(&self, host: &str, port: u16, healthy: bool) {
        let mut brokers = self.write();
        if let Some(broker) = brokers.iter_mut().find(|b| b.is_at(host, port)) {
            if broker.healthy != healthy {
                info!(
                    broker = %broker.name,
                    host = host,
                    port = port,
                    healthy = healthy,
                    "Broker health changed"
                );
            }
            broker.healthy = healthy;
            broker.last_checked_at = Utc::now();
        } else {
            debug!(host = host, port = port, "Ignoring health update for unknown broker");
        }
    }

    pub fn get(&self, host: &str, port: u16) -> Option<Broker> {
        self.read().iter().find(|b| b.is_at(host, port)).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
