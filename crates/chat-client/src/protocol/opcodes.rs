//! Gateway operation codes

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Gateway operation codes
///
/// Frames carry the op code as a raw integer. Codes this client does not know
/// still decode (see [`GatewayMessage::opcode`](super::GatewayMessage::opcode))
/// so they can be logged instead of rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// Server dispatches an event (server only)
    Dispatch = 0,
    /// Heartbeat, sent periodically by the client or requested by the server
    Heartbeat = 1,
    /// Start a new session (client only)
    Identify = 2,
    /// Update the client's presence (client only)
    StatusUpdate = 3,
    /// Join, move or leave a voice channel (client only)
    VoiceStateUpdate = 4,
    /// Resume a dropped session (client only)
    Resume = 6,
    /// Server asks the client to reconnect and resume (server only)
    Reconnect = 7,
    /// Request offline members of a large guild (client only)
    RequestGuildMembers = 8,
    /// Session is invalid; `d` says whether it is resumable (server only)
    InvalidSession = 9,
    /// First frame on a fresh socket, carries the heartbeat interval (server only)
    Hello = 10,
    /// Heartbeat acknowledged (server only)
    HeartbeatAck = 11,
    /// Request guild sync for user accounts (client only)
    GuildSync = 12,
}

impl OpCode {
    /// Create an `OpCode` from a raw integer value
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Dispatch),
            1 => Some(Self::Heartbeat),
            2 => Some(Self::Identify),
            3 => Some(Self::StatusUpdate),
            4 => Some(Self::VoiceStateUpdate),
            6 => Some(Self::Resume),
            7 => Some(Self::Reconnect),
            8 => Some(Self::RequestGuildMembers),
            9 => Some(Self::InvalidSession),
            10 => Some(Self::Hello),
            11 => Some(Self::HeartbeatAck),
            12 => Some(Self::GuildSync),
            _ => None,
        }
    }

    /// Get the raw integer value
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check if this op code can be sent by the client
    #[must_use]
    pub const fn is_client_op(self) -> bool {
        matches!(
            self,
            Self::Heartbeat
                | Self::Identify
                | Self::StatusUpdate
                | Self::VoiceStateUpdate
                | Self::Resume
                | Self::RequestGuildMembers
                | Self::GuildSync
        )
    }

    /// Check if this op code can be sent by the server
    #[must_use]
    pub const fn is_server_op(self) -> bool {
        matches!(
            self,
            Self::Dispatch
                | Self::Heartbeat
                | Self::Reconnect
                | Self::InvalidSession
                | Self::Hello
                | Self::HeartbeatAck
        )
    }

    /// Get the name of this op code
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dispatch => "DISPATCH",
            Self::Heartbeat => "HEARTBEAT",
            Self::Identify => "IDENTIFY",
            Self::StatusUpdate => "STATUS_UPDATE",
            Self::VoiceStateUpdate => "VOICE_STATE_UPDATE",
            Self::Resume => "RESUME",
            Self::Reconnect => "RECONNECT",
            Self::RequestGuildMembers => "REQUEST_GUILD_MEMBERS",
            Self::InvalidSession => "INVALID_SESSION",
            Self::Hello => "HELLO",
            Self::HeartbeatAck => "HEARTBEAT_ACK",
            Self::GuildSync => "GUILD_SYNC",
        }
    }
}

impl Serialize for OpCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for OpCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Self::from_u8(value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid op code: {value}")))
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (OP {})", self.name(), self.as_u8())
    }
}
