//! WebSocket close codes and what the client does about them

use serde::{Deserialize, Serialize};

/// Reason sent with the local close that invalidates a session
pub const INVALIDATE_SESSION_REASON: &str = "INVALIDATE_SESSION";

/// Code used when the socket dropped without any close frame
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Close codes the gateway (or this client) uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum CloseCode {
    /// Normal closure
    Normal = 1000,
    /// Unknown error occurred
    UnknownError = 4000,
    /// Invalid opcode sent
    UnknownOpcode = 4001,
    /// Invalid payload encoding
    DecodeError = 4002,
    /// Sent a payload before IDENTIFY
    NotAuthenticated = 4003,
    /// Invalid token
    AuthenticationFailed = 4004,
    /// Sent IDENTIFY twice
    AlreadyAuthenticated = 4005,
    /// Invalid sequence number for RESUME
    InvalidSequence = 4007,
    /// Sent more than 120 frames in a minute
    RateLimited = 4008,
    /// Session has timed out
    SessionTimeout = 4009,
    /// Invalid shard configuration
    InvalidShard = 4010,
    /// Sharding is required
    ShardingRequired = 4011,
    /// Invalid/outdated API version
    InvalidApiVersion = 4012,
}

/// What to do after the socket closed with a given code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDisposition {
    Reconnect,
    /// Reconnect, but wait out the identify rate limit first
    ReconnectAfterIdentifyDelay,
    /// Do not reconnect; the connection shuts down
    Fatal,
}

impl CloseDisposition {
    #[must_use]
    pub const fn is_reconnect(self) -> bool {
        !matches!(self, Self::Fatal)
    }
}

impl CloseCode {
    /// Create a `CloseCode` from a raw u16 value
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1000 => Some(Self::Normal),
            4000 => Some(Self::UnknownError),
            4001 => Some(Self::UnknownOpcode),
            4002 => Some(Self::DecodeError),
            4003 => Some(Self::NotAuthenticated),
            4004 => Some(Self::AuthenticationFailed),
            4005 => Some(Self::AlreadyAuthenticated),
            4007 => Some(Self::InvalidSequence),
            4008 => Some(Self::RateLimited),
            4009 => Some(Self::SessionTimeout),
            4010 => Some(Self::InvalidShard),
            4011 => Some(Self::ShardingRequired),
            4012 => Some(Self::InvalidApiVersion),
            _ => None,
        }
    }

    /// Get the raw u16 value
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Disposition of a gateway-defined code.
    ///
    /// `Normal` is not decided here: whether a 1000 close is recoverable
    /// depends on who closed and why, see [`classify`].
    #[must_use]
    pub const fn disposition(self) -> CloseDisposition {
        match self {
            Self::AuthenticationFailed
            | Self::InvalidShard
            | Self::ShardingRequired
            | Self::InvalidApiVersion => CloseDisposition::Fatal,
            Self::RateLimited => CloseDisposition::ReconnectAfterIdentifyDelay,
            Self::Normal
            | Self::UnknownError
            | Self::UnknownOpcode
            | Self::DecodeError
            | Self::NotAuthenticated
            | Self::AlreadyAuthenticated
            | Self::InvalidSequence
            | Self::SessionTimeout => CloseDisposition::Reconnect,
        }
    }

    /// Get the description for this close code
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Normal => "Normal closure",
            Self::UnknownError => "Unknown error occurred",
            Self::UnknownOpcode => "Invalid opcode sent",
            Self::DecodeError => "Invalid payload encoding",
            Self::NotAuthenticated => "Not authenticated",
            Self::AuthenticationFailed => "Authentication failed",
            Self::AlreadyAuthenticated => "Already authenticated",
            Self::InvalidSequence => "Invalid sequence number",
            Self::RateLimited => "Rate limited",
            Self::SessionTimeout => "Session timeout",
            Self::InvalidShard => "Invalid shard configuration",
            Self::ShardingRequired => "Sharding required",
            Self::InvalidApiVersion => "Invalid API version",
        }
    }

    /// Get the name of this close code
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::UnknownError => "UnknownError",
            Self::UnknownOpcode => "UnknownOpcode",
            Self::DecodeError => "DecodeError",
            Self::NotAuthenticated => "NotAuthenticated",
            Self::AuthenticationFailed => "AuthenticationFailed",
            Self::AlreadyAuthenticated => "AlreadyAuthenticated",
            Self::InvalidSequence => "InvalidSequence",
            Self::RateLimited => "RateLimited",
            Self::SessionTimeout => "SessionTimeout",
            Self::InvalidShard => "InvalidShard",
            Self::ShardingRequired => "ShardingRequired",
            Self::InvalidApiVersion => "InvalidApiVersion",
        }
    }
}

/// Decide what a close means.
///
/// * `raw` - the effective close code (server frame first, then client frame)
/// * `invalidated` - the local `1000 INVALIDATE_SESSION` close was sent
/// * `closed_by_server` - the server sent the first close frame
///
/// A 1000 close is only recoverable when the server initiated it or the client
/// closed to drop its session; any other local 1000 is a deliberate shutdown.
/// Codes outside the gateway table (1001, 1006, ...) are transport failures and
/// always reconnect.
#[must_use]
pub fn classify(raw: u16, invalidated: bool, closed_by_server: bool) -> CloseDisposition {
    match CloseCode::from_u16(raw) {
        Some(CloseCode::Normal) if !(closed_by_server || invalidated) => CloseDisposition::Fatal,
        Some(code) => code.disposition(),
        None => CloseDisposition::Reconnect,
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.as_u16(), self.description())
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}
