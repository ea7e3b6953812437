//! # chat-cache
//!
//! In-memory caches for the entities a gateway connection materializes.
//!
//! ## Features
//!
//! - **Entity caches**: snowflake-keyed maps for users, guilds and channels
//! - **Pending guilds**: guilds announced by READY that have not arrived yet
//! - **Event cache**: events held back until the entity they reference exists
//!
//! All caches are owned by a client context and cleared as a group when a
//! session is invalidated.
//!
//! ## Example
//!
//! ```ignore
//! use chat_cache::EntityCaches;
//!
//! let caches = EntityCaches::new();
//! caches.guilds.insert(guild_id, guild_json);
//! caches.pending_guilds.insert(other_guild_id);
//!
//! // Session invalidated
//! caches.clear_all();
//! ```

pub mod entity;
pub mod events;
pub mod pending;
mod registry;

pub use entity::{EntityCache, SnowflakeCache};
pub use events::{CachedEvent, EventCache};
pub use pending::PendingGuildQueue;
pub use registry::EntityCaches;
