//! Dispatch path
//!
//! Op 0 frames land here, on the socket loop. While the client is
//! bootstrapping, events that could reference state it does not have yet are
//! held in the replay buffer and dispatched in arrival order once ready.

use super::connection::ConnectionInner;
use super::ConnectionStatus;
use crate::events::{EventType, RawEvent};
use crate::handlers::DispatchContext;
use chat_cache::EntityCache;
use chat_core::{ClientEvent, JsonExt, ReadyEvent};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;

impl ConnectionInner {
    pub(super) fn dispatch(&self, mut event: RawEvent) {
        let mut event_type = EventType::from_str(&event.event_type);

        if let Some(delta) = match event_type {
            Some(EventType::GuildMemberAdd) => Some(1),
            Some(EventType::GuildMemberRemove) => Some(-1),
            _ => None,
        } {
            match event.guild_id() {
                Ok(Some(guild_id)) => self.aggregator.adjust_expected(guild_id, delta),
                Ok(None) => {}
                Err(e) => tracing::warn!(
                    event_type = %event.event_type,
                    error = %e,
                    "Member event without a usable guild_id"
                ),
            }
        }

        if self.initiating.load(Ordering::SeqCst) {
            let chunking = self.chunking_members.load(Ordering::SeqCst);
            let bypasses = event_type.is_some_and(|t| t.bypasses_replay(chunking));

            if !bypasses {
                let unavailable = event.data.opt_bool("unavailable").ok().flatten() == Some(true);

                if chunking && event_type == Some(EventType::GuildDelete) && unavailable {
                    tracing::debug!("Unavailable GUILD_DELETE during member chunking; handling as GUILD_CREATE");
                    event.event_type = EventType::GuildCreate.as_str().to_string();
                    event_type = Some(EventType::GuildCreate);
                } else {
                    self.buffer(event, event_type);
                    return;
                }
            }
        }

        match event_type {
            Some(EventType::PresencesReplace) => return,
            Some(EventType::Ready) => self.on_ready(&event),
            Some(EventType::Resumed) => self.on_resumed(&event),
            _ => self.run_handlers(&event),
        }

        self.check_bootstrap();
    }

    fn buffer(&self, mut event: RawEvent, event_type: Option<EventType>) {
        tracing::debug!(event_type = %event.event_type, "Buffering event until ready");

        // A guild whose GUILD_CREATE is waiting in the buffer no longer holds up the sync
        if event_type == Some(EventType::GuildCreate) {
            if let Ok(guild_id) = event.data.snowflake_field("id") {
                if self.context.caches().pending_guilds.mark_arrived(guild_id) {
                    event = event.into_bootstrap();
                }
            }
        }

        self.replay.lock().push_back(event);
        self.check_bootstrap();
    }

    fn on_ready(&self, event: &RawEvent) {
        self.set_status(ConnectionStatus::SettingUp);

        match event.data.str_field("session_id") {
            Ok(session_id) => self.set_session_id(Some(session_id.to_string())),
            Err(e) => tracing::warn!(error = %e, "READY without a session id"),
        }
        self.systems_ready.store(true, Ordering::SeqCst);
        self.clear_identify_rate_limit();

        tracing::debug!(session_id = ?self.session_id(), "Received READY");
        self.update_traces(&event.data, "READY");

        self.run_handlers(event);
    }

    fn on_resumed(&self, event: &RawEvent) {
        self.mark_identified();

        if !self.systems_ready.load(Ordering::SeqCst) {
            self.set_status(ConnectionStatus::SettingUp);
            self.initiating.store(false, Ordering::SeqCst);
            self.ready();
        }

        self.update_traces(&event.data, "RESUMED");
    }

    /// Route through the handler table, isolating failures to this event
    fn run_handlers(&self, event: &RawEvent) {
        let ctx = DispatchContext::new(
            &self.context,
            &self.config,
            &self.aggregator,
            &self.chunk_queue,
            &self.chunking_members,
        );

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.context.handlers().handle(&ctx, event)
        }));

        match outcome {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => tracing::debug!(
                event_type = %event.event_type,
                payload = %event.data,
                "No handler for dispatch type"
            ),
            Ok(Err(e)) => tracing::warn!(
                event_type = %event.event_type,
                payload = %event.data,
                error = %e,
                "Failed to handle dispatch"
            ),
            Err(_) => tracing::error!(
                event_type = %event.event_type,
                payload = %event.data,
                "Dispatch handler panicked"
            ),
        }
    }

    /// Finish bootstrap once READY is in, no guild is pending and no member chunking is outstanding
    fn check_bootstrap(&self) {
        if self.initiating.load(Ordering::SeqCst)
            && self.systems_ready.load(Ordering::SeqCst)
            && self.context.caches().pending_guilds.is_empty()
            && !self.chunking_members.load(Ordering::SeqCst)
        {
            self.ready();
        }
    }

    fn ready(&self) {
        if self.initiating.swap(false, Ordering::SeqCst) {
            self.systems_ready.store(false, Ordering::SeqCst);

            if self.previously_connected.swap(true, Ordering::SeqCst) {
                tracing::info!("Finished reloading");
            } else {
                tracing::info!("Finished loading");
                let total = self.sequence().unwrap_or(0);
                self.context.emit(ClientEvent::Ready(ReadyEvent::new(total)));
            }
        } else {
            tracing::info!("Finished resuming");
        }

        self.set_status(ConnectionStatus::Connected);

        let mut replayed = 0usize;
        loop {
            let next = self.replay.lock().pop_front();
            let Some(event) = next else { break };
            self.dispatch(event);
            replayed += 1;
        }

        if replayed > 0 {
            tracing::debug!(replayed, "Replayed buffered events");
        }
    }
}
