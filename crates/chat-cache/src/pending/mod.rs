//! Guilds the client is still waiting on during bootstrap

mod pending_guilds;

pub use pending_guilds::PendingGuildQueue;
