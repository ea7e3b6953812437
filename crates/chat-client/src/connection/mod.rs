//! Connection management
//!
//! The gateway connection state machine, its dispatch path and the session
//! manager that serializes fresh IDENTIFYs.

#[allow(clippy::module_inception)]
mod connection;
mod dispatch;
mod error;
mod session_manager;
mod state;

pub use connection::{
    GatewayConnection, IDENTIFY_DELAY, INITIAL_RECONNECT_DELAY, MAX_RECONNECT_DELAY,
};
pub use error::{ConnectionError, SessionManagerError};
pub use session_manager::{QueuedSessionManager, SessionManager};
pub use state::ConnectionStatus;
