//! Pending guild queue.
//!
//! READY announces every guild of the session as unavailable; each one is
//! pending until its GUILD_CREATE arrives. Bootstrap cannot finish while
//! anything is pending.

use crate::entity::EntityCache;
use chat_core::Snowflake;
use dashmap::DashSet;

#[derive(Debug, Default)]
pub struct PendingGuildQueue {
    guilds: DashSet<Snowflake>,
}

impl PendingGuildQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the guild was already pending
    pub fn insert(&self, guild_id: Snowflake) -> bool {
        self.guilds.insert(guild_id)
    }

    /// Mark a guild as arrived. Returns true if it was pending.
    pub fn mark_arrived(&self, guild_id: Snowflake) -> bool {
        self.guilds.remove(&guild_id).is_some()
    }

    pub fn is_pending(&self, guild_id: Snowflake) -> bool {
        self.guilds.contains(&guild_id)
    }
}

impl EntityCache for PendingGuildQueue {
    fn name(&self) -> &'static str {
        "pending_guilds"
    }

    fn len(&self) -> usize {
        self.guilds.len()
    }

    fn clear(&self) {
        self.guilds.clear();
    }
}
