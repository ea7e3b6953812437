//! Handler error types

use chat_core::PayloadError;
use thiserror::Error;

/// Handler error type
///
/// Failures are isolated to the event that caused them; the connection logs
/// them and moves on.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The payload did not have the expected shape
    #[error("Invalid payload: {0}")]
    Payload(#[from] PayloadError),

    /// An outbound frame could not be built
    #[error("Failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Handler result type
pub type HandlerResult<T> = Result<T, HandlerError>;
