//! Event subscription and dispatch.
//!
//! Handlers are awaited one at a time in registration order, so
//! notification processing only completes once every subscriber has run.

use async_trait::async_trait;
use ledger_protocol::LedgerEvent;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// A subscriber to adapter events
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Called for every emitted event, in emission order
    async fn on_event(&self, event: LedgerEvent);
}

/// Registry of event handlers
#[derive(Clone, Default)]
pub struct EventDispatcher {
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
}

impl EventDispatcher {
    /// Create an empty dispatcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; it receives every event emitted afterwards
    pub async fn subscribe(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().await.push(handler);
    }

    /// Deliver `event` to every handler, awaiting each before the next
    pub async fn emit(&self, event: LedgerEvent) {
        debug!(event = event.name(), "emitting ledger event");
        let handlers = self.handlers.read().await.clone();
        for handler in handlers {
            handler.on_event(event.clone()).await;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::CollectingHandler;
    use super::*;

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let dispatcher = EventDispatcher::new();
        let first = Arc::new(CollectingHandler::default());
        let second = Arc::new(CollectingHandler::default());
        dispatcher.subscribe(first.clone()).await;
        dispatcher.subscribe(second.clone()).await;

        dispatcher.emit(LedgerEvent::Connect).await;
        dispatcher.emit(LedgerEvent::Disconnect).await;

        let seen: Vec<&'static str> = first
            .events
            .lock()
            .await
            .iter()
            .map(|e| e.name())
            .collect();
        assert_eq!(seen, vec!["connect", "disconnect"]);
        assert_eq!(second.events.lock().await.len(), 2);
    }
}
