//! Connection status

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a connection is in its lifecycle.
///
/// Happy path: `Disconnected → Connecting → Identifying →
/// AwaitingConfirmation → SettingUp → Connected`. After a drop:
/// `Disconnected → WaitingToReconnect → AttemptingToReconnect`, then either
/// back to `Identifying` or on to `Shutdown`, which is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    /// Socket open, IDENTIFY or RESUME about to go out
    Identifying,
    /// Waiting for READY or RESUMED
    AwaitingConfirmation,
    /// READY received, initial sync in progress
    SettingUp,
    Connected,
    WaitingToReconnect,
    AttemptingToReconnect,
    Shutdown,
}

impl ConnectionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Identifying => "IDENTIFYING",
            Self::AwaitingConfirmation => "AWAITING_CONFIRMATION",
            Self::SettingUp => "SETTING_UP",
            Self::Connected => "CONNECTED",
            Self::WaitingToReconnect => "WAITING_TO_RECONNECT",
            Self::AttemptingToReconnect => "ATTEMPTING_TO_RECONNECT",
            Self::Shutdown => "SHUTDOWN",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Shutdown)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
