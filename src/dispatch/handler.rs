//! Message handler abstraction

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Errors a handler may report for a single inbound message
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Malformed payload: {0}")]
    Malformed(String),
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Handler failed: {0}")]
    Failed(String),
}

/// Receives messages whose topic matched the handler's subscription pattern
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, topic: &str, payload: &str) -> Result<(), HandlerError>;
}

/// Adapter turning an async closure into a [`MessageHandler`]
pub struct FnHandler<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(String, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, topic: &str, payload: &str) -> Result<(), HandlerError> {
        (self.func)(topic.to_string(), payload.to_string()).await
    }
}

/// Wrap an async closure `(topic, payload) -> Result<(), HandlerError>`
pub fn handler_fn<F, Fut>(func: F) -> Arc<dyn MessageHandler>
where
    F: Fn(String, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler { func })
}
