//! Top-level error type for bootstrapping the cluster client
//!
//! Core operations report failure as `false` or `None`; only configuration,
//! registry construction and wire setup surface errors, and they all funnel
//! into [`ClusterError`].

use crate::broker::RegistryError;
use crate::config::ConfigError;
use crate::transport::mqtt::MqttError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Broker registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Transport error: {0}")]
    Transport(#[from] MqttError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ClusterResult<T> = Result<T, ClusterError>;
