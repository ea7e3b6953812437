//! The set of caches a client context owns.

use crate::entity::{EntityCache, SnowflakeCache};
use crate::events::EventCache;
use crate::pending::PendingGuildQueue;

/// Every cache a gateway connection reads or clears.
///
/// Owned by the client context and shared with the entity builder; there is
/// no process-wide instance.
#[derive(Debug)]
pub struct EntityCaches {
    pub users: SnowflakeCache,
    pub guilds: SnowflakeCache,
    pub text_channels: SnowflakeCache,
    pub voice_channels: SnowflakeCache,
    pub categories: SnowflakeCache,
    pub private_channels: SnowflakeCache,
    pub pending_guilds: PendingGuildQueue,
    pub event_cache: EventCache,
}

impl Default for EntityCaches {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityCaches {
    pub fn new() -> Self {
        Self {
            users: SnowflakeCache::new("users"),
            guilds: SnowflakeCache::new("guilds"),
            text_channels: SnowflakeCache::new("text_channels"),
            voice_channels: SnowflakeCache::new("voice_channels"),
            categories: SnowflakeCache::new("categories"),
            private_channels: SnowflakeCache::new("private_channels"),
            pending_guilds: PendingGuildQueue::new(),
            event_cache: EventCache::new(),
        }
    }

    /// All caches, in the order they are cleared
    pub fn all(&self) -> [&dyn EntityCache; 8] {
        [
            &self.users,
            &self.guilds,
            &self.text_channels,
            &self.voice_channels,
            &self.categories,
            &self.private_channels,
            &self.pending_guilds,
            &self.event_cache,
        ]
    }

    /// Clear every cache. Idempotent.
    pub fn clear_all(&self) {
        for cache in self.all() {
            let dropped = cache.len();
            cache.clear();
            if dropped > 0 {
                tracing::trace!(cache = cache.name(), dropped, "Cache cleared");
            }
        }
    }

    pub fn total_len(&self) -> usize {
        self.all().iter().map(|cache| cache.len()).sum()
    }
}
