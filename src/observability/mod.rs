//! Observability: structured logging and the HTTP health endpoint

pub mod health;
pub mod logging;

pub use health::{health_port_from_env, HealthServer};
pub use logging::{init_default_logging, init_logging, LogFormat};

// Span macros for structured logging
pub use logging::{broker_span, dispatch_span};
