//! Result of one health-check cycle

use crate::broker::Broker;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Partition of the registry into healthy and unhealthy brokers at one instant
///
/// `cluster_healthy` is derived from the healthy set and cannot be set
/// independently.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterHealthSnapshot {
    healthy: Vec<Broker>,
    unhealthy: Vec<Broker>,
    cluster_healthy: bool,
    checked_at: DateTime<Utc>,
}

impl ClusterHealthSnapshot {
    /// Partition `brokers` by their health flag, keeping registration order
    pub fn from_brokers(brokers: Vec<Broker>) -> Self {
        let (healthy, unhealthy): (Vec<Broker>, Vec<Broker>) =
            brokers.into_iter().partition(|broker| broker.healthy);
        Self {
            cluster_healthy: !healthy.is_empty(),
            healthy,
            unhealthy,
            checked_at: Utc::now(),
        }
    }

    /// Build from one cycle's `(broker, reachable)` pairs
    ///
    /// Each broker's flag and timestamp are taken from its outcome, not from
    /// whatever the registry holds by the time the cycle finishes.
    pub fn from_outcomes<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = (Broker, bool)>,
    {
        let checked_at = Utc::now();
        let brokers = outcomes
            .into_iter()
            .map(|(mut broker, reachable)| {
                broker.healthy = reachable;
                broker.last_checked_at = checked_at;
                broker
            })
            .collect();
        let mut snapshot = Self::from_brokers(brokers);
        snapshot.checked_at = checked_at;
        snapshot
    }

    pub fn healthy(&self) -> &[Broker] {
        &self.healthy
    }

    pub fn unhealthy(&self) -> &[Broker] {
        &self.unhealthy
    }

    pub fn cluster_healthy(&self) -> bool {
        self.cluster_healthy
    }

    pub fn checked_at(&self) -> DateTime<Utc> {
        self.checked_at
    }

    pub fn total(&self) -> usize {
        self.healthy.len() + self.unhealthy.len()
    }
}
