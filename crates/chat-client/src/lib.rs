//! # chat-client
//!
//! Client for a stateful real-time gateway.
//!
//! ## Features
//!
//! - **Connection state machine**: IDENTIFY or RESUME, reconnects with
//!   capped backoff, session invalidation
//! - **Rate-limited sender**: 120 frames per minute, with headroom kept for
//!   heartbeats and IDENTIFY
//! - **Heartbeat monitor**: liveness pulses and round-trip measurement
//! - **Bootstrap replay**: events received during the initial sync are held
//!   back and replayed in order once the client is ready
//! - **Member chunking**: large guild member lists collected across chunks
//!
//! ## Example
//!
//! ```ignore
//! use chat_client::{ClientContext, GatewayConnection, QueuedSessionManager, WebSocketTransport};
//!
//! let context = ClientContext::default();
//! let mut events = context.subscribe();
//! let connection = GatewayConnection::start(
//!     config.gateway,
//!     context,
//!     Arc::new(WebSocketTransport::new()),
//!     Arc::new(QueuedSessionManager::new()),
//! )
//! .await?;
//!
//! while let Ok(event) = events.recv().await {
//!     if event.is_terminal() {
//!         break;
//!     }
//! }
//! ```

pub mod builder;
pub mod chunking;
pub mod connection;
pub mod context;
pub mod events;
pub mod handlers;
pub mod heartbeat;
pub mod protocol;
pub mod sender;
pub mod transport;

pub use builder::{CachingEntityBuilder, EntityBuilder};
pub use chunking::{ChunkProgress, MemberChunkAggregator};
pub use connection::{
    ConnectionError, ConnectionStatus, GatewayConnection, QueuedSessionManager, SessionManager,
    SessionManagerError, IDENTIFY_DELAY,
};
pub use context::ClientContext;
pub use events::{EventType, RawEvent};
pub use handlers::{DispatchContext, EventHandler, HandlerError, HandlerRegistry, HandlerResult};
pub use transport::{
    CloseInfo, SocketHandle, Transport, TransportError, TransportEvent, WebSocketTransport,
};
