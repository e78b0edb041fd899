//! rumqttc-backed wire client
//!
//! The module is split into three focused sub-modules:
//!
//! - [`connection`] - Pure option building, connection state and errors
//! - [`events`] - Pure routing of rumqttc events
//! - [`client`] - Impure I/O: the session, its event-loop task and operations
//!
//! # Usage
//!
//! ```rust,no_run
//! use brokerlink::broker::Broker;
//! use brokerlink::config::MqttSection;
//! use brokerlink::transport::mqtt::MqttWireClient;
//! use brokerlink::transport::WireClient;
//!
//! # tokio_test::block_on(async {
//! let client = MqttWireClient::new(MqttSection::default());
//! let broker = Broker::new("local", "localhost", 1883, 1);
//!
//! client.connect(&broker).await?;
//! client.publish("iot/greenhouse/temperature", "{}").await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod events;

pub use client::MqttWireClient;
pub use connection::{configure_mqtt_options, ConnectionState, MqttError};
pub use events::{EventRoute, EventRouter};
