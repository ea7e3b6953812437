//! Client context
//!
//! Everything a connection shares with the code built on top of it: the
//! caches, the entity builder, the handler table and the event stream.

use crate::builder::{CachingEntityBuilder, EntityBuilder};
use crate::handlers::HandlerRegistry;
use chat_cache::EntityCaches;
use chat_core::ClientEvent;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the client event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct ClientContext {
    caches: Arc<EntityCaches>,
    entity_builder: Arc<dyn EntityBuilder>,
    handlers: Arc<HandlerRegistry>,
    events: broadcast::Sender<ClientEvent>,
}

impl ClientContext {
    /// Context with the caching entity builder and the built-in handlers
    pub fn new(caches: Arc<EntityCaches>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            entity_builder: Arc::new(CachingEntityBuilder::new(Arc::clone(&caches))),
            caches,
            handlers: Arc::new(HandlerRegistry::with_defaults()),
            events,
        }
    }

    #[must_use]
    pub fn with_entity_builder(mut self, entity_builder: Arc<dyn EntityBuilder>) -> Self {
        self.entity_builder = entity_builder;
        self
    }

    #[must_use]
    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = Arc::new(handlers);
        self
    }

    pub fn caches(&self) -> &EntityCaches {
        &self.caches
    }

    pub fn entity_builder(&self) -> &dyn EntityBuilder {
        self.entity_builder.as_ref()
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: ClientEvent) {
        tracing::trace!(event_type = %event.event_type(), "Emitting client event");
        let _ = self.events.send(event);
    }
}

impl Default for ClientContext {
    fn default() -> Self {
        Self::new(Arc::new(EntityCaches::new()))
    }
}

impl std::fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext")
            .field("caches", &self.caches)
            .field("handlers", &self.handlers)
            .field("subscribers", &self.events.receiver_count())
            .finish_non_exhaustive()
    }
}
