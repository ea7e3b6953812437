//! Pass-through handler

use super::{DispatchContext, EventHandler, HandlerResult};
use crate::events::RawEvent;
use chat_core::ClientEvent;

/// Publishes the event to subscribers as-is.
///
/// Events for a guild that has not arrived yet are parked in the event cache
/// and played back by the guild's GUILD_CREATE.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForwardingHandler;

impl EventHandler for ForwardingHandler {
    fn handle(&self, ctx: &DispatchContext<'_>, event: &RawEvent) -> HandlerResult<()> {
        if let Some(guild_id) = event.guild_id()? {
            if ctx.caches().pending_guilds.is_pending(guild_id) {
                ctx.caches().event_cache.cache(guild_id, event.into());
                return Ok(());
            }
        }

        ctx.emit(ClientEvent::Dispatch(event.to_dispatch()));
        Ok(())
    }
}
