//! GUILD_MEMBERS_CHUNK

use super::{DispatchContext, EventHandler, HandlerResult};
use crate::chunking::ChunkProgress;
use crate::events::RawEvent;
use chat_core::JsonExt;

#[derive(Debug, Default, Clone, Copy)]
pub struct MembersChunkHandler;

impl EventHandler for MembersChunkHandler {
    fn handle(&self, ctx: &DispatchContext<'_>, event: &RawEvent) -> HandlerResult<()> {
        let guild_id = event.data.snowflake_field("guild_id")?;
        let members = event.data.array_field("members")?.clone();

        let result: HandlerResult<()> = match ctx.aggregator().add_fragment(guild_id, members) {
            ChunkProgress::Complete(chunks) => ctx
                .entity_builder()
                .materialize_member_chunks(guild_id, chunks)
                .map(|count| {
                    tracing::debug!(guild_id = %guild_id, members = count, "Guild member chunking complete");
                })
                .map_err(Into::into),
            ChunkProgress::Pending { .. } => Ok(()),
            ChunkProgress::Untracked => {
                tracing::warn!(guild_id = %guild_id, "Member chunk for a guild that is not being chunked");
                Ok(())
            }
        };

        ctx.finish_chunking_if_idle();
        result
    }
}
