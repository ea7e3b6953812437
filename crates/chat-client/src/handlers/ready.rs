//! READY
//!
//! The connection has already taken the session id; this handler registers
//! the session's guilds and hands the rest to the entity builder.

use super::guild::set_up_guild;
use super::{DispatchContext, EventHandler, HandlerResult};
use crate::events::RawEvent;
use chat_core::JsonExt;
use serde_json::Value;

#[derive(Debug, Default, Clone, Copy)]
pub struct ReadyHandler;

impl EventHandler for ReadyHandler {
    fn handle(&self, ctx: &DispatchContext<'_>, event: &RawEvent) -> HandlerResult<()> {
        let guilds = event
            .data
            .get("guilds")
            .and_then(Value::as_array)
            .map_or(&[][..], Vec::as_slice);

        let mut pending = 0usize;
        for guild in guilds {
            match register_guild(ctx, guild) {
                Ok(true) => pending += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(guild = %guild, error = %e, "Skipping malformed guild in READY");
                }
            }
        }

        ctx.entity_builder().materialize_ready_payload(&event.data)?;

        tracing::debug!(guilds = guilds.len(), pending, "READY processed");
        Ok(())
    }
}

/// Set up an available guild or queue it as pending. True if it is pending.
fn register_guild(ctx: &DispatchContext<'_>, guild: &Value) -> HandlerResult<bool> {
    if guild.opt_bool("unavailable")? == Some(false) {
        set_up_guild(ctx, guild)?;
        Ok(false)
    } else {
        ctx.caches().pending_guilds.insert(guild.snowflake_field("id")?);
        Ok(true)
    }
}
