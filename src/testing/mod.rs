//! Testing utilities and mock implementations
//!
//! Mocks for the wire client and the health probe, so fail-over behaviour can
//! be tested without running MQTT brokers.

pub mod mocks;

pub use mocks::*;
