//! Long-running service roles
//!
//! Each role is an independent loop owning a shutdown receiver; the binary
//! picks which ones to run.

pub mod health_check;
pub mod publisher;
pub mod subscriber;

pub use health_check::HealthCheckService;
pub use publisher::PublisherService;
pub use subscriber::{SubscriberService, TemperatureLogHandler};
