//! Client events - emitted by a gateway connection to whoever subscribed to it
//!
//! Only three lifecycle events are produced by the connection itself
//! (`Ready`, `Disconnect`, `Shutdown`). Per-type dispatch handlers publish
//! everything else as `Dispatch`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientEvent {
    Ready(ReadyEvent),
    Disconnect(DisconnectEvent),
    Shutdown(ShutdownEvent),
    Dispatch(DispatchEvent),
}

impl ClientEvent {
    pub fn event_type(&self) -> &str {
        match self {
            Self::Ready(_) => "READY",
            Self::Disconnect(_) => "DISCONNECT",
            Self::Shutdown(_) => "SHUTDOWN",
            Self::Dispatch(e) => &e.event_type,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Ready(e) => e.timestamp,
            Self::Disconnect(e) => e.timestamp,
            Self::Shutdown(e) => e.timestamp,
            Self::Dispatch(e) => e.timestamp,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Shutdown(_))
    }
}

/// A websocket close frame as seen by one side of the connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseFrame {
    pub code: u16,
    #[serde(default)]
    pub reason: String,
}

impl CloseFrame {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Fired once, the first time the connection finishes its initial sync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyEvent {
    /// Sequence number of the last dispatch received when the sync finished
    pub response_total: u64,
    pub timestamp: DateTime<Utc>,
}

impl ReadyEvent {
    pub fn new(response_total: u64) -> Self {
        Self {
            response_total,
            timestamp: Utc::now(),
        }
    }
}

/// Fired on every recoverable disconnect, before the reconnect starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisconnectEvent {
    pub server_close: Option<CloseFrame>,
    pub client_close: Option<CloseFrame>,
    pub closed_by_server: bool,
    pub timestamp: DateTime<Utc>,
}

impl DisconnectEvent {
    pub fn new(
        server_close: Option<CloseFrame>,
        client_close: Option<CloseFrame>,
        closed_by_server: bool,
    ) -> Self {
        Self {
            server_close,
            client_close,
            closed_by_server,
            timestamp: Utc::now(),
        }
    }
}

/// Terminal: the connection will not reconnect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownEvent {
    pub close_code: u16,
    pub timestamp: DateTime<Utc>,
}

impl ShutdownEvent {
    pub fn new(close_code: u16) -> Self {
        Self {
            close_code,
            timestamp: Utc::now(),
        }
    }
}

/// A gateway dispatch forwarded as-is by a handler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchEvent {
    pub event_type: String,
    pub sequence: Option<u64>,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl DispatchEvent {
    pub fn new(event_type: impl Into<String>, sequence: Option<u64>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            sequence,
            data,
            timestamp: Utc::now(),
        }
    }
}
