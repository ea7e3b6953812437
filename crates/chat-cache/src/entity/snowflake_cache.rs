//! Concurrent snowflake → entity map.

use chat_core::Snowflake;
use dashmap::DashMap;
use serde_json::Value;

/// Behaviour every cache owned by the client context shares.
///
/// Invalidating a session clears every cache through this trait, so new
/// caches only need to be registered to take part.
pub trait EntityCache: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Must be idempotent.
    fn clear(&self);
}

/// Snowflake-keyed cache of materialized entities.
///
/// Entities default to their raw JSON document; the object model that sits
/// on top of the client decides what to store.
#[derive(Debug)]
pub struct SnowflakeCache<T = Value> {
    name: &'static str,
    entries: DashMap<Snowflake, T>,
}

impl<T: Clone> SnowflakeCache<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: DashMap::new(),
        }
    }

    /// Insert or replace, returning the previous entity
    pub fn insert(&self, id: Snowflake, entity: T) -> Option<T> {
        self.entries.insert(id, entity)
    }

    pub fn get(&self, id: Snowflake) -> Option<T> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: Snowflake) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn remove(&self, id: Snowflake) -> Option<T> {
        self.entries.remove(&id).map(|(_, entity)| entity)
    }

    /// Snapshot of the cached ids, in no particular order
    pub fn ids(&self) -> Vec<Snowflake> {
        self.entries.iter().map(|entry| *entry.key()).collect()
    }
}

impl<T: Clone + Send + Sync> EntityCache for SnowflakeCache<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&self) {
        self.entries.clear();
    }
}
