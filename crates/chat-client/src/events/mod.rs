//! Inbound dispatch events
//!
//! Event type names and the raw form a dispatch travels in until a handler
//! decodes it.

mod event_types;
mod raw;

pub use event_types::EventType;
pub use raw::RawEvent;
