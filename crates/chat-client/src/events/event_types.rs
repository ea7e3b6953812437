//! Dispatch event types
//!
//! Names carried in the `t` field of op 0 frames. Types the client does not
//! know are not an error; they decode to `None` and are logged.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    // Session
    Ready,
    Resumed,

    // Guilds
    GuildCreate,
    GuildUpdate,
    GuildDelete,
    GuildSync,
    GuildBanAdd,
    GuildBanRemove,
    GuildEmojisUpdate,
    GuildRoleCreate,
    GuildRoleUpdate,
    GuildRoleDelete,

    // Members
    GuildMembersChunk,
    GuildMemberAdd,
    GuildMemberUpdate,
    GuildMemberRemove,

    // Channels
    ChannelCreate,
    ChannelUpdate,
    ChannelDelete,
    ChannelPinsUpdate,

    // Messages
    MessageCreate,
    MessageUpdate,
    MessageDelete,
    MessageDeleteBulk,
    MessageReactionAdd,
    MessageReactionRemove,
    MessageReactionRemoveAll,

    // Presence
    PresenceUpdate,
    PresencesReplace,
    TypingStart,

    // User
    UserUpdate,
    UserSettingsUpdate,

    // Voice
    VoiceStateUpdate,
    VoiceServerUpdate,
}

impl EventType {
    pub const ALL: [Self; 34] = [
        Self::Ready,
        Self::Resumed,
        Self::GuildCreate,
        Self::GuildUpdate,
        Self::GuildDelete,
        Self::GuildSync,
        Self::GuildBanAdd,
        Self::GuildBanRemove,
        Self::GuildEmojisUpdate,
        Self::GuildRoleCreate,
        Self::GuildRoleUpdate,
        Self::GuildRoleDelete,
        Self::GuildMembersChunk,
        Self::GuildMemberAdd,
        Self::GuildMemberUpdate,
        Self::GuildMemberRemove,
        Self::ChannelCreate,
        Self::ChannelUpdate,
        Self::ChannelDelete,
        Self::ChannelPinsUpdate,
        Self::MessageCreate,
        Self::MessageUpdate,
        Self::MessageDelete,
        Self::MessageDeleteBulk,
        Self::MessageReactionAdd,
        Self::MessageReactionRemove,
        Self::MessageReactionRemoveAll,
        Self::PresenceUpdate,
        Self::PresencesReplace,
        Self::TypingStart,
        Self::UserUpdate,
        Self::UserSettingsUpdate,
        Self::VoiceStateUpdate,
        Self::VoiceServerUpdate,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Resumed => "RESUMED",
            Self::GuildCreate => "GUILD_CREATE",
            Self::GuildUpdate => "GUILD_UPDATE",
            Self::GuildDelete => "GUILD_DELETE",
            Self::GuildSync => "GUILD_SYNC",
            Self::GuildBanAdd => "GUILD_BAN_ADD",
            Self::GuildBanRemove => "GUILD_BAN_REMOVE",
            Self::GuildEmojisUpdate => "GUILD_EMOJIS_UPDATE",
            Self::GuildRoleCreate => "GUILD_ROLE_CREATE",
            Self::GuildRoleUpdate => "GUILD_ROLE_UPDATE",
            Self::GuildRoleDelete => "GUILD_ROLE_DELETE",
            Self::GuildMembersChunk => "GUILD_MEMBERS_CHUNK",
            Self::GuildMemberAdd => "GUILD_MEMBER_ADD",
            Self::GuildMemberUpdate => "GUILD_MEMBER_UPDATE",
            Self::GuildMemberRemove => "GUILD_MEMBER_REMOVE",
            Self::ChannelCreate => "CHANNEL_CREATE",
            Self::ChannelUpdate => "CHANNEL_UPDATE",
            Self::ChannelDelete => "CHANNEL_DELETE",
            Self::ChannelPinsUpdate => "CHANNEL_PINS_UPDATE",
            Self::MessageCreate => "MESSAGE_CREATE",
            Self::MessageUpdate => "MESSAGE_UPDATE",
            Self::MessageDelete => "MESSAGE_DELETE",
            Self::MessageDeleteBulk => "MESSAGE_DELETE_BULK",
            Self::MessageReactionAdd => "MESSAGE_REACTION_ADD",
            Self::MessageReactionRemove => "MESSAGE_REACTION_REMOVE",
            Self::MessageReactionRemoveAll => "MESSAGE_REACTION_REMOVE_ALL",
            Self::PresenceUpdate => "PRESENCE_UPDATE",
            Self::PresencesReplace => "PRESENCES_REPLACE",
            Self::TypingStart => "TYPING_START",
            Self::UserUpdate => "USER_UPDATE",
            Self::UserSettingsUpdate => "USER_SETTINGS_UPDATE",
            Self::VoiceStateUpdate => "VOICE_STATE_UPDATE",
            Self::VoiceServerUpdate => "VOICE_SERVER_UPDATE",
        }
    }

    /// Parse an event type name. Expects the upper-case form.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.as_str() == s)
    }

    /// Handled while the client is still bootstrapping
    #[must_use]
    pub const fn bypasses_replay(self, chunking_members: bool) -> bool {
        match self {
            Self::Ready | Self::GuildMembersChunk | Self::Resumed | Self::GuildSync => true,
            Self::GuildCreate => !chunking_members,
            _ => false,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<EventType> for String {
    fn from(event: EventType) -> Self {
        event.as_str().to_string()
    }
}
