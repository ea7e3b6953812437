//! Dispatch handlers
//!
//! One handler per event type, looked up in a table built once per client
//! context. Handlers run on the connection's socket loop, one event at a
//! time, in arrival order.

mod error;
mod forward;
mod guild;
mod members_chunk;
mod ready;

pub use error::{HandlerError, HandlerResult};
pub use forward::ForwardingHandler;
pub use guild::{GuildCreateHandler, GuildDeleteHandler};
pub use members_chunk::MembersChunkHandler;
pub use ready::ReadyHandler;

use crate::builder::EntityBuilder;
use crate::chunking::MemberChunkAggregator;
use crate::context::ClientContext;
use crate::events::{EventType, RawEvent};
use crate::protocol::{GatewayMessage, RequestGuildMembersPayload};
use crate::sender::SendQueue;
use chat_cache::EntityCaches;
use chat_common::GatewayConfig;
use chat_core::{ClientEvent, Snowflake};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub trait EventHandler: Send + Sync {
    fn handle(&self, ctx: &DispatchContext<'_>, event: &RawEvent) -> HandlerResult<()>;
}

/// What a handler may touch on the connection that runs it
pub struct DispatchContext<'a> {
    client: &'a ClientContext,
    config: &'a GatewayConfig,
    aggregator: &'a MemberChunkAggregator,
    chunk_queue: &'a SendQueue,
    chunking_members: &'a AtomicBool,
}

impl<'a> DispatchContext<'a> {
    pub fn new(
        client: &'a ClientContext,
        config: &'a GatewayConfig,
        aggregator: &'a MemberChunkAggregator,
        chunk_queue: &'a SendQueue,
        chunking_members: &'a AtomicBool,
    ) -> Self {
        Self {
            client,
            config,
            aggregator,
            chunk_queue,
            chunking_members,
        }
    }

    pub fn client(&self) -> &ClientContext {
        self.client
    }

    pub fn caches(&self) -> &EntityCaches {
        self.client.caches()
    }

    pub fn entity_builder(&self) -> &dyn EntityBuilder {
        self.client.entity_builder()
    }

    pub fn config(&self) -> &GatewayConfig {
        self.config
    }

    pub fn aggregator(&self) -> &MemberChunkAggregator {
        self.aggregator
    }

    pub fn is_chunking(&self) -> bool {
        self.chunking_members.load(Ordering::SeqCst)
    }

    /// Track a guild's member list and ask the gateway for it
    pub fn start_chunking(&self, guild_id: Snowflake, member_count: u64) -> HandlerResult<()> {
        self.aggregator
            .set_expected(guild_id, i64::try_from(member_count).unwrap_or(i64::MAX));
        self.chunking_members.store(true, Ordering::SeqCst);
        self.queue_chunk_request(guild_id)?;

        tracing::debug!(guild_id = %guild_id, member_count, "Requested guild members");
        Ok(())
    }

    /// Clear the chunking flag once no guild is waiting for members
    pub fn finish_chunking_if_idle(&self) {
        if self.aggregator.is_empty() && self.chunking_members.swap(false, Ordering::SeqCst) {
            tracing::debug!("Member chunking finished");
        }
    }

    pub fn queue_chunk_request(&self, guild_id: Snowflake) -> HandlerResult<()> {
        let frame =
            GatewayMessage::request_guild_members(&RequestGuildMembersPayload::all(guild_id))?
                .to_json()?;
        self.chunk_queue.push(frame);
        Ok(())
    }

    /// Returns true if the guild was still pending
    pub fn mark_guild_arrived(&self, guild_id: Snowflake) -> bool {
        self.caches().pending_guilds.mark_arrived(guild_id)
    }

    pub fn emit(&self, event: ClientEvent) {
        self.client.emit(event);
    }

    /// Run `event` through the handler table
    pub fn redispatch(&self, event: &RawEvent) -> HandlerResult<bool> {
        self.client.handlers().handle(self, event)
    }
}

/// Event type → handler table
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<EventType, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    /// An empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in handlers.
    ///
    /// READY, GUILD_CREATE, GUILD_DELETE and GUILD_MEMBERS_CHUNK get bespoke
    /// handlers; every other known type is forwarded to subscribers. RESUMED
    /// and PRESENCES_REPLACE never reach the table.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let forward: Arc<dyn EventHandler> = Arc::new(ForwardingHandler);

        for event in EventType::ALL {
            let handler: Arc<dyn EventHandler> = match event {
                EventType::Resumed | EventType::PresencesReplace => continue,
                EventType::Ready => Arc::new(ReadyHandler),
                EventType::GuildCreate => Arc::new(GuildCreateHandler),
                EventType::GuildDelete => Arc::new(GuildDeleteHandler),
                EventType::GuildMembersChunk => Arc::new(MembersChunkHandler),
                _ => Arc::clone(&forward),
            };
            registry.register(event, handler);
        }

        registry
    }

    /// Install a handler, returning the one it replaced
    pub fn register(
        &mut self,
        event: EventType,
        handler: Arc<dyn EventHandler>,
    ) -> Option<Arc<dyn EventHandler>> {
        self.handlers.insert(event, handler)
    }

    pub fn get(&self, event: EventType) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(&event)
    }

    /// Route an event by its type. Ok(false) if nothing handles it.
    pub fn handle(&self, ctx: &DispatchContext<'_>, event: &RawEvent) -> HandlerResult<bool> {
        let handler = EventType::from_str(&event.event_type).and_then(|t| self.handlers.get(&t));

        match handler {
            Some(handler) => {
                handler.handle(ctx, event)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().map(|t| t.as_str()).collect();
        types.sort_unstable();
        f.debug_struct("HandlerRegistry").field("types", &types).finish()
    }
}
