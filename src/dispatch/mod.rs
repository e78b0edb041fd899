//! Topic-subscription dispatch
//!
//! Inbound `(topic, payload)` pairs arrive from the wire client and are routed
//! to every registered [`MessageHandler`] whose [`TopicFilter`] matches.

pub mod dispatcher;
pub mod filter;
pub mod handler;

pub use dispatcher::{Dispatcher, SubscriptionId};
pub use filter::{FilterError, MatchMode, TopicFilter};
pub use handler::{handler_fn, FnHandler, HandlerError, MessageHandler};
