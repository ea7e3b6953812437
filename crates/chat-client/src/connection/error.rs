//! Connection error types

use crate::transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectionError {
    /// `connect()` after `shutdown()`
    #[error("Connection has been shut down")]
    Shutdown,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Raised by a session manager that will not take a connection
#[derive(Debug, Error)]
pub enum SessionManagerError {
    #[error("Session manager is closed")]
    Closed,
}
