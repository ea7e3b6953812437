//! GUILD_CREATE and GUILD_DELETE

use super::{DispatchContext, EventHandler, HandlerResult};
use crate::events::RawEvent;
use chat_core::{ClientEvent, JsonExt, Snowflake};
use serde_json::Value;

/// Materialize a full guild and start member chunking if it is large
pub(super) fn set_up_guild(ctx: &DispatchContext<'_>, data: &Value) -> HandlerResult<Snowflake> {
    let guild_id = ctx.entity_builder().materialize_guild(data)?;

    let member_count = data.get("member_count").and_then(Value::as_u64).unwrap_or(0);
    let large = data.opt_bool("large")?.unwrap_or(false);

    if large || member_count > u64::from(ctx.config().large_threshold) {
        ctx.start_chunking(guild_id, member_count)?;
    }

    Ok(guild_id)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GuildCreateHandler;

impl EventHandler for GuildCreateHandler {
    fn handle(&self, ctx: &DispatchContext<'_>, event: &RawEvent) -> HandlerResult<()> {
        let guild_id = event.data.snowflake_field("id")?;
        let was_pending = ctx.mark_guild_arrived(guild_id) || event.bootstrap;

        if event.data.opt_bool("unavailable")? == Some(true) {
            tracing::debug!(guild_id = %guild_id, "Guild is unavailable");
            return Ok(());
        }

        set_up_guild(ctx, &event.data)?;

        for cached in ctx.caches().event_cache.play_back(guild_id) {
            let replayed = RawEvent::from(cached);
            if let Err(e) = ctx.redispatch(&replayed) {
                tracing::warn!(
                    guild_id = %guild_id,
                    event_type = %replayed.event_type,
                    error = %e,
                    "Failed to play back cached event"
                );
            }
        }

        // Guilds from READY are part of the initial sync; anything else is a join
        if !was_pending {
            ctx.emit(ClientEvent::Dispatch(event.to_dispatch()));
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GuildDeleteHandler;

impl EventHandler for GuildDeleteHandler {
    fn handle(&self, ctx: &DispatchContext<'_>, event: &RawEvent) -> HandlerResult<()> {
        let guild_id = event.data.snowflake_field("id")?;

        if event.data.opt_bool("unavailable")? == Some(true) {
            tracing::warn!(guild_id = %guild_id, "Guild became unavailable");
        } else {
            ctx.entity_builder().remove_guild(guild_id);
            tracing::debug!(guild_id = %guild_id, "Guild removed");
        }

        ctx.emit(ClientEvent::Dispatch(event.to_dispatch()));
        Ok(())
    }
}
