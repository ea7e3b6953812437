//! Deferred events keyed by the entity they reference

mod event_cache;

pub use event_cache::{CachedEvent, EventCache};
