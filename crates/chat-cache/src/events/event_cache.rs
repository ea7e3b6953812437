//! Event cache.
//!
//! Holds dispatch payloads that reference an entity the client has not
//! materialized yet (typically a guild that is still pending). When the
//! entity shows up the cached events are played back in arrival order.

use crate::entity::EntityCache;
use chat_core::Snowflake;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

/// A deferred dispatch: event type plus its raw `d` payload
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEvent {
    pub event_type: String,
    pub sequence: Option<u64>,
    pub data: Value,
}

#[derive(Debug, Default)]
pub struct EventCache {
    // One lock keeps per-entity ordering and the total count consistent
    events: Mutex<HashMap<Snowflake, Vec<CachedEvent>>>,
}

impl EventCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self, entity_id: Snowflake, event: CachedEvent) {
        let mut events = self.events.lock();
        let queue = events.entry(entity_id).or_default();
        queue.push(event);
        tracing::debug!(
            entity_id = %entity_id,
            cached = queue.len(),
            "Cached event for unknown entity"
        );
    }

    /// Remove and return every event cached for `entity_id`, oldest first
    pub fn play_back(&self, entity_id: Snowflake) -> Vec<CachedEvent> {
        self.events.lock().remove(&entity_id).unwrap_or_default()
    }

    pub fn cached_for(&self, entity_id: Snowflake) -> usize {
        self.events.lock().get(&entity_id).map_or(0, Vec::len)
    }
}

impl EntityCache for EventCache {
    fn name(&self) -> &'static str {
        "event_cache"
    }

    /// Total number of cached events across all entities
    fn len(&self) -> usize {
        self.events.lock().values().map(Vec::len).sum()
    }

    fn clear(&self) {
        let mut events = self.events.lock();
        if !events.is_empty() {
            tracing::debug!(entities = events.len(), "Clearing event cache");
        }
        events.clear();
    }
}
