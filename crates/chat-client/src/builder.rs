//! Entity builder
//!
//! Turns raw gateway documents into cached entities. The connection and the
//! dispatch handlers only call through [`EntityBuilder`]; the object model
//! layered on top of the client can swap in its own implementation.

use chat_cache::EntityCaches;
use chat_core::{JsonExt, PayloadResult, Snowflake};
use serde_json::Value;
use std::sync::Arc;

/// Channel `type` values the caching builder sorts on
const TEXT_CHANNEL: u64 = 0;
const VOICE_CHANNEL: u64 = 2;
const CATEGORY_CHANNEL: u64 = 4;

pub trait EntityBuilder: Send + Sync {
    /// Store what READY carries about the session (current user, DMs).
    ///
    /// Guilds listed in READY are handled by the connection, not here.
    fn materialize_ready_payload(&self, data: &Value) -> PayloadResult<()>;

    /// Store a full guild document, returning its id
    fn materialize_guild(&self, data: &Value) -> PayloadResult<Snowflake>;

    /// Store every member of a completed chunk set. Returns the member count.
    fn materialize_member_chunks(
        &self,
        guild_id: Snowflake,
        chunks: Vec<Vec<Value>>,
    ) -> PayloadResult<usize>;

    /// Forget a guild that was left or deleted
    fn remove_guild(&self, guild_id: Snowflake);
}

/// Builder that keeps raw documents in the context's caches
#[derive(Debug, Clone)]
pub struct CachingEntityBuilder {
    caches: Arc<EntityCaches>,
}

impl CachingEntityBuilder {
    pub fn new(caches: Arc<EntityCaches>) -> Self {
        Self { caches }
    }

    fn cache_user(&self, user: &Value) -> PayloadResult<()> {
        let id = user.snowflake_field("id")?;
        self.caches.users.insert(id, user.clone());
        Ok(())
    }

    fn cache_channel(&self, guild_id: Snowflake, channel: &Value) -> PayloadResult<()> {
        let id = channel.snowflake_field("id")?;
        let kind = channel.u64_field("type")?;

        let mut doc = channel.clone();
        if let Value::Object(map) = &mut doc {
            map.entry("guild_id")
                .or_insert_with(|| Value::String(guild_id.to_string()));
        }

        match kind {
            TEXT_CHANNEL => self.caches.text_channels.insert(id, doc),
            VOICE_CHANNEL => self.caches.voice_channels.insert(id, doc),
            CATEGORY_CHANNEL => self.caches.categories.insert(id, doc),
            other => {
                tracing::debug!(channel_id = %id, channel_type = other, "Skipping unknown channel type");
                None
            }
        };
        Ok(())
    }
}

impl EntityBuilder for CachingEntityBuilder {
    fn materialize_ready_payload(&self, data: &Value) -> PayloadResult<()> {
        self.cache_user(data.field("user")?)?;

        if let Some(channels) = data.get("private_channels").and_then(Value::as_array) {
            for channel in channels {
                let id = channel.snowflake_field("id")?;
                self.caches.private_channels.insert(id, channel.clone());
            }
        }

        Ok(())
    }

    fn materialize_guild(&self, data: &Value) -> PayloadResult<Snowflake> {
        let guild_id = data.snowflake_field("id")?;

        if let Some(channels) = data.get("channels").and_then(Value::as_array) {
            for channel in channels {
                self.cache_channel(guild_id, channel)?;
            }
        }

        if let Some(members) = data.get("members").and_then(Value::as_array) {
            for member in members {
                self.cache_user(member.field("user")?)?;
            }
        }

        self.caches.guilds.insert(guild_id, data.clone());
        tracing::debug!(guild_id = %guild_id, "Guild materialized");

        Ok(guild_id)
    }

    fn materialize_member_chunks(
        &self,
        guild_id: Snowflake,
        chunks: Vec<Vec<Value>>,
    ) -> PayloadResult<usize> {
        let mut count = 0;
        for member in chunks.iter().flatten() {
            self.cache_user(member.field("user")?)?;
            count += 1;
        }

        tracing::debug!(guild_id = %guild_id, members = count, "Guild members materialized");
        Ok(count)
    }

    fn remove_guild(&self, guild_id: Snowflake) {
        self.caches.guilds.remove(guild_id);
    }
}
