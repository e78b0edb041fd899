//! Fan-out of inbound messages to matching handlers

use super::filter::{FilterError, MatchMode, TopicFilter};
use super::handler::MessageHandler;
use crate::transport::InboundMessage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn, Instrument};

/// Handle to one registered handler, used to take it back out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    filter: TopicFilter,
    handler: Arc<dyn MessageHandler>,
}

/// Routes each inbound message to every handler whose filter matches
pub struct Dispatcher {
    mode: MatchMode,
    next_id: AtomicU64,
    subscriptions: RwLock<Vec<Subscription>>,
}

impl Dispatcher {
    pub fn new(mode: MatchMode) -> Self {
        Self {
            mode,
            next_id: AtomicU64::new(0),
            subscriptions: RwLock::new(Vec::new()),
        }
    }

    /// Compile a pattern with this dispatcher's match mode
    pub fn compile(&self, pattern: &str) -> Result<TopicFilter, FilterError> {
        TopicFilter::parse(pattern, self.mode)
    }

    pub fn register(
        &self,
        pattern: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<SubscriptionId, FilterError> {
        let filter = self.compile(pattern)?;
        Ok(self.insert(filter, handler))
    }

    /// Add an already compiled filter
    pub fn insert(&self, filter: TopicFilter, handler: Arc<dyn MessageHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(pattern = filter.pattern(), "Registering message handler");
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription {
                id,
                filter,
                handler,
            });
        id
    }

    /// Remove one handler; other handlers on the same pattern stay
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscriptions.len();
        subscriptions.retain(|sub| sub.id != id);
        subscriptions.len() != before
    }

    /// Distinct registered patterns, in registration order
    pub fn patterns(&self) -> Vec<String> {
        let subscriptions = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let mut patterns: Vec<String> = Vec::with_capacity(subscriptions.len());
        for sub in subscriptions.iter() {
            if !patterns.iter().any(|p| p == sub.filter.pattern()) {
                patterns.push(sub.filter.pattern().to_string());
            }
        }
        patterns
    }

    pub fn len(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn matching_handlers(&self, topic: &str) -> Vec<(String, Arc<dyn MessageHandler>)> {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|sub| sub.filter.matches(topic))
            .map(|sub| (sub.filter.pattern().to_string(), Arc::clone(&sub.handler)))
            .collect()
    }

    /// Deliver one message to every matching handler
    ///
    /// Each handler runs on its own task; an error or panic in one of them is
    /// logged and does not affect the others. Returns how many succeeded.
    pub async fn dispatch(&self, topic: &str, payload: &str) -> usize {
        let handlers = self.matching_handlers(topic);
        if handlers.is_empty() {
            debug!(topic = topic, "No handler registered for topic");
            return 0;
        }

        let topic: Arc<str> = Arc::from(topic);
        let payload: Arc<str> = Arc::from(payload);

        let tasks = handlers.into_iter().map(|(pattern, handler)| {
            let topic = Arc::clone(&topic);
            let payload = Arc::clone(&payload);
            let span = crate::dispatch_span!(topic = %topic, pattern = %pattern);
            let handle = tokio::spawn(
                async move { handler.handle(&topic, &payload).await }.instrument(span),
            );
            async move { (pattern, handle.await) }
        });

        let mut delivered = 0;
        for (pattern, outcome) in futures::future::join_all(tasks).await {
            match outcome {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(topic = %topic, pattern = %pattern, "Message handler failed: {}", e);
                }
                Err(e) => {
                    error!(topic = %topic, pattern = %pattern, "Message handler panicked: {}", e);
                }
            }
        }
        delivered
    }

    /// Pump inbound messages until the channel closes or shutdown is signalled
    pub async fn run(
        self: Arc<Self>,
        mut inbound: mpsc::Receiver<InboundMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Message dispatcher started");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown signal received, stopping message dispatcher");
                        break;
                    }
                }
                message = inbound.recv() => match message {
                    Some(message) => {
                        debug!(topic = %message.topic, "Dispatching inbound message");
                        self.dispatch(&message.topic, &message.payload).await;
                    }
                    None => {
                        info!("Inbound channel closed, stopping message dispatcher");
                        break;
                    }
                },
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(MatchMode::default())
    }
}
