//! brokerlink - failover-aware MQTT client for clusters of prioritized brokers
//!
//! # Overview
//!
//! - A [`broker::BrokerRegistry`] holds the known brokers, their priority and
//!   their last observed health.
//! - A [`health::HealthMonitor`] probes every broker on a fixed interval.
//! - A [`connection::ConnectionManager`] keeps one session to the healthiest
//!   broker, demotes brokers on transport failure and reselects lazily.
//! - A [`dispatch::Dispatcher`] routes inbound messages to handlers by MQTT
//!   topic filter.
//!
//! # Quick Start
//!
//! ```rust
//! use brokerlink::broker::{Broker, BrokerRegistry};
//! use brokerlink::connection::ConnectionManager;
//! use brokerlink::dispatch::Dispatcher;
//! use brokerlink::testing::MockWireClient;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let registry = BrokerRegistry::new(vec![
//!     Broker::new("primary", "mqtt1.local", 1883, 1),
//!     Broker::new("backup", "mqtt2.local", 1883, 2),
//! ])
//! .unwrap();
//!
//! let manager = ConnectionManager::new(
//!     registry,
//!     Arc::new(MockWireClient::new()),
//!     Arc::new(Dispatcher::default()),
//! );
//!
//! assert!(manager.publish("iot/greenhouse/temperature", "{}").await);
//! assert_eq!(manager.active_broker().await.unwrap().name, "primary");
//! # });
//! ```

pub mod broker;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod observability;
pub mod sensor;
pub mod service;
pub mod shutdown;
pub mod testing;
pub mod transport;

pub use broker::{Broker, BrokerKey, BrokerRegistry};
pub use config::ClusterConfig;
pub use connection::{ConnectionManager, ConnectionStatus};
pub use dispatch::{handler_fn, Dispatcher, MatchMode, MessageHandler, TopicFilter};
pub use error::{ClusterError, ClusterResult};
pub use health::{ClusterHealthSnapshot, HealthMonitor};
pub use transport::mqtt::MqttWireClient;
pub use transport::{InboundMessage, WireClient};
