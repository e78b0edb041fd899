//! Fail-over connection management
//!
//! The [`ConnectionManager`] keeps at most one active session to the healthiest
//! broker. A failed connect or transport error demotes the broker and clears
//! the session; the next operation reselects. Nothing reconnects in the
//! background.

pub mod manager;
pub mod status;

pub use manager::ConnectionManager;
pub use status::ConnectionStatus;
