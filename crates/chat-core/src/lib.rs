//! # chat-core
//!
//! Domain layer shared by the gateway client crates: snowflake identifiers,
//! the events a client emits to its consumers, and the error raised when a
//! gateway payload does not have the shape the client expects.
//! This crate has no dependency on the transport or the runtime.

pub mod error;
pub mod events;
pub mod json;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use error::{PayloadError, PayloadResult};
pub use events::{
    ClientEvent, CloseFrame, DisconnectEvent, DispatchEvent, ReadyEvent, ShutdownEvent,
};
pub use json::JsonExt;
pub use value_objects::{Snowflake, SnowflakeParseError};
