//! Undecoded dispatch

use chat_cache::CachedEvent;
use chat_core::{DispatchEvent, JsonExt, PayloadResult, Snowflake};
use serde_json::Value;

/// An op 0 frame after the connection has read `t` and `s` off it
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    /// Upper-cased `t`
    pub event_type: String,
    pub sequence: Option<u64>,
    pub data: Value,
    /// GUILD_CREATE for a READY guild that was held back while chunking
    pub bootstrap: bool,
}

impl RawEvent {
    pub fn new(event_type: impl Into<String>, sequence: Option<u64>, data: Value) -> Self {
        Self {
            event_type: event_type.into().to_uppercase(),
            sequence,
            data,
            bootstrap: false,
        }
    }

    /// `d.guild_id`, if the event carries one
    pub fn guild_id(&self) -> PayloadResult<Option<Snowflake>> {
        match self.data.get("guild_id") {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.data.snowflake_field("guild_id").map(Some),
        }
    }

    /// Mark this event as part of the initial sync
    #[must_use]
    pub fn into_bootstrap(mut self) -> Self {
        self.bootstrap = true;
        self
    }

    pub fn to_dispatch(&self) -> DispatchEvent {
        DispatchEvent::new(self.event_type.clone(), self.sequence, self.data.clone())
    }
}

impl From<CachedEvent> for RawEvent {
    fn from(event: CachedEvent) -> Self {
        Self::new(event.event_type, event.sequence, event.data)
    }
}

impl From<&RawEvent> for CachedEvent {
    fn from(event: &RawEvent) -> Self {
        Self {
            event_type: event.event_type.clone(),
            sequence: event.sequence,
            data: event.data.clone(),
        }
    }
}
