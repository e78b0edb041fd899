//! Broker health monitoring
//!
//! The [`HealthMonitor`] probes every broker in the registry on a fixed
//! interval and records each outcome as the broker's health flag. Selection in
//! the connection manager only ever sees those flags.

pub mod monitor;
pub mod probe;
pub mod snapshot;

pub use monitor::HealthMonitor;
pub use probe::{build_probe, MqttProbe, Probe, ProbeError, TcpProbe};
pub use snapshot::ClusterHealthSnapshot;
